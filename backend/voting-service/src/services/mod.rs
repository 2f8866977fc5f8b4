pub mod aggregator;
pub mod bridge;
pub mod posts;
pub mod propagator;
pub mod ranking;
pub mod resolver;
pub mod retry;
pub mod voting;

pub use aggregator::{ReconcileReport, ScoreAggregator, ScoreRecount};
pub use bridge::{forward_remote_changes, BridgedChangeSink};
pub use posts::PostService;
pub use propagator::{ChangePropagator, ChangeSink, Subscription, SubscriptionId};
pub use ranking::{feed_order, leaderboard_order, top_n, RankingView};
pub use resolver::{resolve, VoteChange, VoteLedgerOp};
pub use retry::{with_retry, with_store_timeout, RetryPolicy};
pub use voting::{VoteOutcome, VoteService};
