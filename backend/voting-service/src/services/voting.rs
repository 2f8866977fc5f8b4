//! Vote command: read, resolve, conditionally write, then hand off to the
//! score aggregator.

use super::aggregator::ScoreAggregator;
use super::propagator::ChangeSink;
use super::resolver::{resolve, VoteChange, VoteLedgerOp};
use super::retry::with_store_timeout;
use crate::config::VotingConfig;
use crate::domain::models::{NewVote, VoteDirection};
use crate::error::{ServiceError, ServiceResult};
use crate::repository::{PostStore, VoteLedger};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vote_events::MutationEvent;

/// What a committed vote command did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteOutcome {
    pub post_id: Uuid,
    pub change: VoteChange,
    /// The voter's vote after the command; None after a toggle-off
    pub direction: Option<VoteDirection>,
    /// Fresh net score, or None if the recompute had not finished within the
    /// configured wait. The vote is committed either way.
    pub net_score: Option<i64>,
}

#[derive(Clone)]
pub struct VoteService {
    ledger: Arc<dyn VoteLedger>,
    posts: Arc<dyn PostStore>,
    aggregator: ScoreAggregator,
    sink: Arc<dyn ChangeSink>,
    config: VotingConfig,
}

impl VoteService {
    pub fn new(
        ledger: Arc<dyn VoteLedger>,
        posts: Arc<dyn PostStore>,
        aggregator: ScoreAggregator,
        sink: Arc<dyn ChangeSink>,
        config: VotingConfig,
    ) -> Self {
        Self {
            ledger,
            posts,
            aggregator,
            sink,
            config,
        }
    }

    /// Apply one vote from `voter_id` on `post_id`.
    ///
    /// Repeating the current direction removes the vote; the opposite
    /// direction switches it in place. A conditional write that loses to a
    /// concurrent command for the same pair restarts from a fresh read, up to
    /// `max_attempts` times.
    pub async fn cast_vote(
        &self,
        voter_id: Option<Uuid>,
        post_id: Uuid,
        direction: VoteDirection,
    ) -> ServiceResult<VoteOutcome> {
        let voter_id = match voter_id {
            Some(id) if !id.is_nil() => id,
            _ => return Err(ServiceError::Unauthenticated),
        };

        let post = with_store_timeout(
            self.config.store_timeout,
            "get_post",
            self.posts.get_post(post_id),
        )
        .await?;
        if post.is_none() {
            return Err(ServiceError::NotFound(format!("post {}", post_id)));
        }

        let op = self.commit(voter_id, post_id, direction).await?;

        self.sink.publish(vote_event(op, voter_id, post_id));

        let recompute = self.aggregator.spawn_recompute(post_id);
        let net_score = match tokio::time::timeout(self.config.score_wait, recompute).await {
            Ok(Ok(recount)) => recount.map(|r| r.net_score()),
            Ok(Err(e)) => {
                warn!(post_id = %post_id, error = %e, "Score recompute task aborted");
                None
            }
            // Keeps running in the background
            Err(_) => None,
        };

        info!(
            voter_id = %voter_id,
            post_id = %post_id,
            change = ?op.kind(),
            direction = ?op.resulting_direction(),
            net_score = ?net_score,
            "Vote committed"
        );

        Ok(VoteOutcome {
            post_id,
            change: op.kind(),
            direction: op.resulting_direction(),
            net_score,
        })
    }

    async fn commit(
        &self,
        voter_id: Uuid,
        post_id: Uuid,
        direction: VoteDirection,
    ) -> ServiceResult<VoteLedgerOp> {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let existing = with_store_timeout(
                self.config.store_timeout,
                "get_vote",
                self.ledger.get_vote(voter_id, post_id),
            )
            .await?;

            let op = resolve(existing.as_ref(), direction);

            // A timeout here is not retried: the write may have landed
            match self.apply(op, voter_id, post_id).await {
                Ok(()) => return Ok(op),
                Err(e @ ServiceError::Transient(_)) => {
                    self.settle_unconfirmed(op, voter_id, post_id);
                    return Err(e);
                }
                Err(ServiceError::Conflict(reason)) => {
                    debug!(
                        voter_id = %voter_id,
                        post_id = %post_id,
                        attempt,
                        reason = %reason,
                        "Stale vote decision, re-reading"
                    );
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            voter_id = %voter_id,
            post_id = %post_id,
            attempts = max_attempts,
            "Vote kept conflicting with concurrent writes"
        );
        Err(ServiceError::Transient(format!(
            "vote on post {} conflicted {} times, retry later",
            post_id, max_attempts
        )))
    }

    /// A write whose acknowledgement timed out may still have committed, so
    /// the post is recounted and observers told as if it had
    fn settle_unconfirmed(&self, op: VoteLedgerOp, voter_id: Uuid, post_id: Uuid) {
        warn!(
            voter_id = %voter_id,
            post_id = %post_id,
            change = ?op.kind(),
            "Vote write unconfirmed, recounting anyway"
        );
        self.sink.publish(vote_event(op, voter_id, post_id));
        drop(self.aggregator.spawn_recompute(post_id));
    }

    async fn apply(&self, op: VoteLedgerOp, voter_id: Uuid, post_id: Uuid) -> ServiceResult<()> {
        let timeout = self.config.store_timeout;
        match op {
            VoteLedgerOp::Insert(direction) => {
                let vote = NewVote {
                    voter_id,
                    post_id,
                    direction,
                };
                with_store_timeout(timeout, "insert_vote", self.ledger.insert_vote(vote))
                    .await
                    .map(|_| ())
            }
            VoteLedgerOp::Update {
                vote_id,
                expected,
                direction,
            } => with_store_timeout(
                timeout,
                "update_vote_direction",
                self.ledger.update_vote_direction(vote_id, expected, direction),
            )
            .await
            .map(|_| ()),
            VoteLedgerOp::Delete { vote_id, expected } => {
                with_store_timeout(
                    timeout,
                    "delete_vote",
                    self.ledger.delete_vote(vote_id, expected),
                )
                .await
            }
        }
    }
}

fn vote_event(op: VoteLedgerOp, voter_id: Uuid, post_id: Uuid) -> MutationEvent {
    match op {
        VoteLedgerOp::Insert(_) => MutationEvent::VoteInserted { post_id, voter_id },
        VoteLedgerOp::Update { .. } => MutationEvent::VoteUpdated { post_id, voter_id },
        VoteLedgerOp::Delete { .. } => MutationEvent::VoteDeleted { post_id, voter_id },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{NewPost, Vote};
    use crate::repository::{InMemoryPostStore, InMemoryVoteLedger};
    use crate::services::retry::RetryPolicy;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct NullSink;

    impl ChangeSink for NullSink {
        fn publish(&self, _event: MutationEvent) {}
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<MutationEvent>>,
    }

    impl ChangeSink for RecordingSink {
        fn publish(&self, event: MutationEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    /// Ledger whose inserts commit but acknowledge only after a long stall
    struct SlowAckLedger {
        inner: InMemoryVoteLedger,
        stall: Duration,
    }

    #[async_trait]
    impl VoteLedger for SlowAckLedger {
        async fn get_vote(&self, voter_id: Uuid, post_id: Uuid) -> ServiceResult<Option<Vote>> {
            self.inner.get_vote(voter_id, post_id).await
        }

        async fn insert_vote(&self, vote: NewVote) -> ServiceResult<Vote> {
            let committed = self.inner.insert_vote(vote).await?;
            tokio::time::sleep(self.stall).await;
            Ok(committed)
        }

        async fn update_vote_direction(
            &self,
            vote_id: Uuid,
            expected: VoteDirection,
            direction: VoteDirection,
        ) -> ServiceResult<Vote> {
            self.inner
                .update_vote_direction(vote_id, expected, direction)
                .await
        }

        async fn delete_vote(&self, vote_id: Uuid, expected: VoteDirection) -> ServiceResult<()> {
            self.inner.delete_vote(vote_id, expected).await
        }

        async fn list_votes_for_post(&self, post_id: Uuid) -> ServiceResult<Vec<Vote>> {
            self.inner.list_votes_for_post(post_id).await
        }

        async fn list_votes_for_voter(&self, voter_id: Uuid) -> ServiceResult<Vec<Vote>> {
            self.inner.list_votes_for_voter(voter_id).await
        }
    }

    /// Ledger whose conditional writes always lose
    struct ContendedLedger {
        inner: InMemoryVoteLedger,
        writes: AtomicU32,
    }

    #[async_trait]
    impl VoteLedger for ContendedLedger {
        async fn get_vote(&self, voter_id: Uuid, post_id: Uuid) -> ServiceResult<Option<Vote>> {
            self.inner.get_vote(voter_id, post_id).await
        }

        async fn insert_vote(&self, _vote: NewVote) -> ServiceResult<Vote> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::Conflict("lost the race".into()))
        }

        async fn update_vote_direction(
            &self,
            vote_id: Uuid,
            expected: VoteDirection,
            direction: VoteDirection,
        ) -> ServiceResult<Vote> {
            self.inner
                .update_vote_direction(vote_id, expected, direction)
                .await
        }

        async fn delete_vote(&self, vote_id: Uuid, expected: VoteDirection) -> ServiceResult<()> {
            self.inner.delete_vote(vote_id, expected).await
        }

        async fn list_votes_for_post(&self, post_id: Uuid) -> ServiceResult<Vec<Vote>> {
            self.inner.list_votes_for_post(post_id).await
        }

        async fn list_votes_for_voter(&self, voter_id: Uuid) -> ServiceResult<Vec<Vote>> {
            self.inner.list_votes_for_voter(voter_id).await
        }
    }

    fn service(ledger: Arc<dyn VoteLedger>, posts: Arc<dyn PostStore>) -> VoteService {
        let sink: Arc<dyn ChangeSink> = Arc::new(NullSink);
        let aggregator = ScoreAggregator::new(
            ledger.clone(),
            posts.clone(),
            sink.clone(),
            RetryPolicy::default(),
            Duration::from_secs(1),
        );
        VoteService::new(
            ledger,
            posts,
            aggregator,
            sink,
            VotingConfig {
                max_attempts: 3,
                score_wait: Duration::from_secs(1),
                ..Default::default()
            },
        )
    }

    async fn new_post(posts: &InMemoryPostStore) -> Uuid {
        posts
            .create_post(NewPost {
                title: "Surprised Pikachu".into(),
                image_url: "https://img/pikachu.png".into(),
                author_id: None,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_anonymous_vote_rejected_without_write() {
        let ledger = InMemoryVoteLedger::new();
        let posts = InMemoryPostStore::new();
        let post_id = new_post(&posts).await;
        let votes = service(Arc::new(ledger.clone()), Arc::new(posts));

        for voter in [None, Some(Uuid::nil())] {
            let result = votes.cast_vote(voter, post_id, VoteDirection::Up).await;
            assert!(matches!(result, Err(ServiceError::Unauthenticated)));
        }
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_post_rejected() {
        let ledger = InMemoryVoteLedger::new();
        let votes = service(
            Arc::new(ledger.clone()),
            Arc::new(InMemoryPostStore::new()),
        );

        let result = votes
            .cast_vote(Some(Uuid::new_v4()), Uuid::new_v4(), VoteDirection::Down)
            .await;

        assert!(matches!(result, Err(ServiceError::NotFound(_))));
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn test_outcome_reports_change_and_score() {
        let posts = InMemoryPostStore::new();
        let post_id = new_post(&posts).await;
        let votes = service(Arc::new(InMemoryVoteLedger::new()), Arc::new(posts));
        let voter = Some(Uuid::new_v4());

        let first = votes.cast_vote(voter, post_id, VoteDirection::Up).await.unwrap();
        assert_eq!(first.change, VoteChange::Inserted);
        assert_eq!(first.direction, Some(VoteDirection::Up));
        assert_eq!(first.net_score, Some(1));

        let switched = votes.cast_vote(voter, post_id, VoteDirection::Down).await.unwrap();
        assert_eq!(switched.change, VoteChange::Switched);
        assert_eq!(switched.net_score, Some(-1));

        let removed = votes.cast_vote(voter, post_id, VoteDirection::Down).await.unwrap();
        assert_eq!(removed.change, VoteChange::Removed);
        assert_eq!(removed.direction, None);
        assert_eq!(removed.net_score, Some(0));
    }

    #[tokio::test]
    async fn test_persistent_conflict_surfaces_as_transient() {
        let posts = InMemoryPostStore::new();
        let post_id = new_post(&posts).await;
        let ledger = Arc::new(ContendedLedger {
            inner: InMemoryVoteLedger::new(),
            writes: AtomicU32::new(0),
        });
        let votes = service(ledger.clone(), Arc::new(posts));

        let result = votes
            .cast_vote(Some(Uuid::new_v4()), post_id, VoteDirection::Up)
            .await;

        assert!(matches!(result, Err(ServiceError::Transient(_))));
        assert_eq!(ledger.writes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_write_still_recounts() {
        let posts = InMemoryPostStore::new();
        let post_id = new_post(&posts).await;
        let inner = InMemoryVoteLedger::new();
        let ledger: Arc<dyn VoteLedger> = Arc::new(SlowAckLedger {
            inner: inner.clone(),
            stall: Duration::from_secs(10),
        });
        let sink = Arc::new(RecordingSink::default());
        let store: Arc<dyn PostStore> = Arc::new(posts.clone());
        let aggregator = ScoreAggregator::new(
            ledger.clone(),
            store.clone(),
            sink.clone(),
            RetryPolicy::default(),
            Duration::from_secs(1),
        );
        let votes = VoteService::new(
            ledger,
            store,
            aggregator,
            sink.clone(),
            VotingConfig {
                store_timeout: Duration::from_millis(100),
                ..Default::default()
            },
        );
        let voter = Uuid::new_v4();

        let result = votes.cast_vote(Some(voter), post_id, VoteDirection::Up).await;
        assert!(matches!(result, Err(ServiceError::Transient(_))));

        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(inner.list_votes_for_post(post_id).await.unwrap().len(), 1);
        let post = posts.get_post(post_id).await.unwrap().unwrap();
        assert_eq!(post.net_score, 1);

        let events = sink.events.lock().unwrap();
        assert!(events.contains(&MutationEvent::VoteInserted { post_id, voter_id: voter }));
        assert!(events.contains(&MutationEvent::NetScoreUpdated { post_id, net_score: 1 }));
    }
}
