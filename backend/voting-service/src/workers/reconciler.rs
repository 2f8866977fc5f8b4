//! Score Reconciliation Background Job
//!
//! Recounts every post's net score on a fixed interval. A vote whose
//! recompute exhausted its retries, or two instances recounting the same post
//! out of order, can leave a cached score stale; this pass bounds how long
//! that lasts.

use crate::config::AggregationConfig;
use crate::services::ScoreAggregator;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

#[derive(Clone)]
pub struct ReconcilerConfig {
    pub enabled: bool,
    pub interval: Duration,
}

impl From<&AggregationConfig> for ReconcilerConfig {
    fn from(config: &AggregationConfig) -> Self {
        Self {
            enabled: !config.reconcile_interval.is_zero(),
            interval: config.reconcile_interval,
        }
    }
}

/// Runs until the task is aborted
pub async fn start_score_reconciler(aggregator: ScoreAggregator, config: ReconcilerConfig) {
    if !config.enabled {
        tracing::info!("Score reconciliation disabled by configuration");
        return;
    }

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        "Starting score reconciliation background job"
    );

    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately; startup is not a reason to recount
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if let Err(e) = aggregator.reconcile_all().await {
            tracing::warn!(error = %e, "Score reconciliation pass failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Post;
    use crate::repository::{InMemoryPostStore, InMemoryVoteLedger, PostStore};
    use crate::services::{ChangeSink, RetryPolicy};
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;
    use vote_events::MutationEvent;

    struct NullSink;

    impl ChangeSink for NullSink {
        fn publish(&self, _event: MutationEvent) {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_drift_is_repaired_on_first_interval() {
        let posts = InMemoryPostStore::new();
        let post_id = Uuid::new_v4();
        posts.insert_post(Post {
            id: post_id,
            title: "stale".into(),
            image_url: "https://img/stale.png".into(),
            author_id: None,
            created_at: Utc::now(),
            net_score: 42,
        });
        let aggregator = ScoreAggregator::new(
            Arc::new(InMemoryVoteLedger::new()),
            Arc::new(posts.clone()),
            Arc::new(NullSink),
            RetryPolicy::default(),
            Duration::from_secs(1),
        );

        let job = tokio::spawn(start_score_reconciler(
            aggregator,
            ReconcilerConfig {
                enabled: true,
                interval: Duration::from_secs(60),
            },
        ));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(posts.get_post(post_id).await.unwrap().unwrap().net_score, 42);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(posts.get_post(post_id).await.unwrap().unwrap().net_score, 0);

        job.abort();
    }

    #[test]
    fn test_zero_interval_disables() {
        let config = ReconcilerConfig::from(&AggregationConfig {
            reconcile_interval: Duration::ZERO,
            ..Default::default()
        });
        assert!(!config.enabled);
    }
}
