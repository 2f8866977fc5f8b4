use crate::config::{Config, VotingConfig};
use crate::repository::{
    IdentityDirectory, InMemoryIdentityDirectory, InMemoryPostStore, InMemoryVoteLedger,
    PgIdentityDirectory, PgPostStore, PgVoteLedger, PostStore, VoteLedger,
};
use crate::services::{
    BridgedChangeSink, ChangePropagator, ChangeSink, PostService, RankingView, RetryPolicy,
    ScoreAggregator, VoteService,
};
use sqlx::PgPool;
use std::sync::Arc;
use vote_events::EventPublisher;

/// Storage collaborators behind the core
#[derive(Clone)]
pub struct Stores {
    pub ledger: Arc<dyn VoteLedger>,
    pub posts: Arc<dyn PostStore>,
    pub identities: Arc<dyn IdentityDirectory>,
}

impl Stores {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            ledger: Arc::new(PgVoteLedger::new(pool.clone())),
            posts: Arc::new(PgPostStore::new(pool.clone())),
            identities: Arc::new(PgIdentityDirectory::new(pool)),
        }
    }

    /// Empty process-local stores; every author resolves as anonymous
    pub fn in_memory() -> Self {
        Self {
            ledger: Arc::new(InMemoryVoteLedger::new()),
            posts: Arc::new(InMemoryPostStore::new()),
            identities: Arc::new(InMemoryIdentityDirectory::new()),
        }
    }
}

/// The assembled voting core, shared by handlers and workers
#[derive(Clone)]
pub struct VotingCore {
    pub votes: VoteService,
    pub posts: PostService,
    pub ranking: RankingView,
    pub aggregator: ScoreAggregator,
    pub propagator: ChangePropagator,
    pub settings: VotingConfig,
}

impl VotingCore {
    /// `remote` mirrors every local mutation to other instances
    pub fn new(
        stores: Stores,
        config: &Config,
        propagator: ChangePropagator,
        remote: Option<EventPublisher>,
    ) -> Self {
        let sink: Arc<dyn ChangeSink> =
            Arc::new(BridgedChangeSink::new(propagator.clone(), remote));
        let store_timeout = config.voting.store_timeout;

        let aggregator = ScoreAggregator::new(
            stores.ledger.clone(),
            stores.posts.clone(),
            sink.clone(),
            RetryPolicy::from(&config.aggregation),
            store_timeout,
        );

        Self {
            votes: VoteService::new(
                stores.ledger.clone(),
                stores.posts.clone(),
                aggregator.clone(),
                sink.clone(),
                config.voting.clone(),
            ),
            posts: PostService::new(stores.posts.clone(), sink, store_timeout),
            ranking: RankingView::new(stores.ledger, stores.posts, stores.identities, store_timeout),
            aggregator,
            propagator,
            settings: config.voting.clone(),
        }
    }
}
