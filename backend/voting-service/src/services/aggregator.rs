//! Score aggregation: the only writer of `posts.net_score`.
//!
//! Every recompute is a full recount of the post's ledger rows, so any number
//! of concurrent or repeated runs converge on the same value. A per-post
//! async mutex keeps two recounts of one post from interleaving their read
//! and write inside this process; recounts of different posts never share a
//! lock. Instances racing across processes are covered by the periodic
//! [`ScoreAggregator::reconcile_all`] pass.

use super::propagator::ChangeSink;
use super::retry::{with_retry, with_store_timeout, RetryPolicy};
use crate::domain::models::ScoreTally;
use crate::error::ServiceResult;
use crate::repository::{PostStore, VoteLedger};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use vote_events::MutationEvent;

/// Result of one recount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreRecount {
    pub tally: ScoreTally,
    /// Cached value the recount replaced
    pub previous: i64,
}

impl ScoreRecount {
    pub fn net_score(&self) -> i64 {
        self.tally.net()
    }

    pub fn changed(&self) -> bool {
        self.previous != self.tally.net()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub posts_checked: usize,
    pub scores_corrected: usize,
    pub failures: usize,
    pub duration_ms: u64,
}

#[derive(Clone)]
pub struct ScoreAggregator {
    ledger: Arc<dyn VoteLedger>,
    posts: Arc<dyn PostStore>,
    sink: Arc<dyn ChangeSink>,
    policy: RetryPolicy,
    store_timeout: Duration,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ScoreAggregator {
    pub fn new(
        ledger: Arc<dyn VoteLedger>,
        posts: Arc<dyn PostStore>,
        sink: Arc<dyn ChangeSink>,
        policy: RetryPolicy,
        store_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            posts,
            sink,
            policy,
            store_timeout,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Recount the post's votes and store the net score.
    ///
    /// Publishes `NetScoreUpdated` only when the cached value actually moved.
    pub async fn recompute(&self, post_id: Uuid) -> ServiceResult<ScoreRecount> {
        let lock = self
            .locks
            .entry(post_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.recount(post_id).await
        };

        drop(lock);
        // Only the map itself still holds the lock: nobody is waiting on it
        self.locks
            .remove_if(&post_id, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    async fn recount(&self, post_id: Uuid) -> ServiceResult<ScoreRecount> {
        let votes = with_store_timeout(
            self.store_timeout,
            "list_votes_for_post",
            self.ledger.list_votes_for_post(post_id),
        )
        .await?;
        let tally = ScoreTally::from_votes(&votes);

        let previous = with_store_timeout(
            self.store_timeout,
            "update_net_score",
            self.posts.update_net_score(post_id, tally.net()),
        )
        .await?;

        let recount = ScoreRecount { tally, previous };
        if recount.changed() {
            debug!(
                post_id = %post_id,
                previous,
                net_score = tally.net(),
                upvotes = tally.upvotes,
                downvotes = tally.downvotes,
                "Net score updated"
            );
            self.sink.publish(MutationEvent::NetScoreUpdated {
                post_id,
                net_score: tally.net(),
            });
        }

        Ok(recount)
    }

    /// `recompute` with backoff on retryable failures
    pub async fn recompute_with_retry(&self, post_id: Uuid) -> ServiceResult<ScoreRecount> {
        with_retry(&self.policy, "recompute_score", || self.recompute(post_id)).await
    }

    /// Fire-and-continue recompute, detached from the caller's lifetime.
    ///
    /// The handle yields None when every retry failed; the cached score then
    /// stays stale until the next vote on the post or the next reconcile.
    pub fn spawn_recompute(&self, post_id: Uuid) -> JoinHandle<Option<ScoreRecount>> {
        let aggregator = self.clone();
        tokio::spawn(async move {
            match aggregator.recompute_with_retry(post_id).await {
                Ok(recount) => Some(recount),
                Err(e) => {
                    error!(
                        post_id = %post_id,
                        error = %e,
                        "Score recompute failed, cached score left stale"
                    );
                    None
                }
            }
        })
    }

    /// Recount every post. One post failing does not stop the pass.
    pub async fn reconcile_all(&self) -> ServiceResult<ReconcileReport> {
        let start = Instant::now();
        let posts = with_store_timeout(self.store_timeout, "list_posts", self.posts.list_posts())
            .await?;

        let mut report = ReconcileReport {
            posts_checked: posts.len(),
            ..Default::default()
        };

        for post in posts {
            match self.recompute_with_retry(post.id).await {
                Ok(recount) if recount.changed() => {
                    warn!(
                        post_id = %post.id,
                        cached = recount.previous,
                        actual = recount.net_score(),
                        "Corrected drifted net score"
                    );
                    report.scores_corrected += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(post_id = %post.id, error = %e, "Reconcile failed for post");
                    report.failures += 1;
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            posts_checked = report.posts_checked,
            scores_corrected = report.scores_corrected,
            failures = report.failures,
            duration_ms = report.duration_ms,
            "Score reconciliation finished"
        );

        Ok(report)
    }

    /// Per-post locks currently allocated
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }
}
