#![allow(dead_code)]

use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;
use voting_service::config::{
    AggregationConfig, AppConfig, Config, PropagationConfig, StorageBackend, VotingConfig,
};
use voting_service::domain::{CreatePostRequest, Post};
use voting_service::repository::{InMemoryIdentityDirectory, InMemoryPostStore, InMemoryVoteLedger};
use voting_service::services::ChangePropagator;
use voting_service::{Stores, VotingCore};

pub const WINDOW: Duration = Duration::from_millis(50);

pub fn test_config() -> Config {
    Config {
        app: AppConfig {
            env: "test".into(),
            host: "127.0.0.1".into(),
            http_port: 0,
            log_format: "text".into(),
        },
        storage: StorageBackend::Memory,
        database: None,
        redis: None,
        voting: VotingConfig {
            max_attempts: 50,
            score_wait: Duration::from_secs(5),
            ..Default::default()
        },
        aggregation: AggregationConfig {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
            ..Default::default()
        },
        propagation: PropagationConfig {
            coalesce_window: WINDOW,
            ..Default::default()
        },
    }
}

/// A core over in-memory stores, with handles to poke the stores directly
pub struct Harness {
    pub core: VotingCore,
    pub ledger: InMemoryVoteLedger,
    pub posts: InMemoryPostStore,
    pub identities: InMemoryIdentityDirectory,
    pub dispatcher: JoinHandle<()>,
}

pub fn harness() -> Harness {
    let config = test_config();
    let ledger = InMemoryVoteLedger::new();
    let posts = InMemoryPostStore::new();
    let identities = InMemoryIdentityDirectory::new();
    let stores = Stores {
        ledger: std::sync::Arc::new(ledger.clone()),
        posts: std::sync::Arc::new(posts.clone()),
        identities: std::sync::Arc::new(identities.clone()),
    };

    let (propagator, dispatcher) = ChangePropagator::spawn(&config.propagation);
    let core = VotingCore::new(stores, &config, propagator, None);

    Harness {
        core,
        ledger,
        posts,
        identities,
        dispatcher,
    }
}

impl Harness {
    pub async fn post(&self, title: &str, author: Option<Uuid>) -> Post {
        self.core
            .posts
            .create_post(
                author,
                CreatePostRequest::new(title, format!("https://img/{}.png", title)),
            )
            .await
            .expect("create post")
    }

    pub async fn net_score(&self, post_id: Uuid) -> i64 {
        use voting_service::repository::PostStore;
        self.posts
            .get_post(post_id)
            .await
            .unwrap()
            .expect("post exists")
            .net_score
    }

    /// Up minus down straight from the ledger
    pub async fn ledger_score(&self, post_id: Uuid) -> i64 {
        use voting_service::domain::ScoreTally;
        use voting_service::repository::VoteLedger;
        let votes = self.ledger.list_votes_for_post(post_id).await.unwrap();
        ScoreTally::from_votes(&votes).net()
    }
}
