//! Connects the local propagator to the Redis change channel.

use super::propagator::{ChangePropagator, ChangeSink};
use crate::error::ServiceResult;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use vote_events::{EventPublisher, EventSubscriber, MutationEvent};

/// Publishes locally and, when configured, to every other instance
#[derive(Clone)]
pub struct BridgedChangeSink {
    local: ChangePropagator,
    remote: Option<Arc<EventPublisher>>,
}

impl BridgedChangeSink {
    pub fn new(local: ChangePropagator, remote: Option<EventPublisher>) -> Self {
        Self {
            local,
            remote: remote.map(Arc::new),
        }
    }

    pub fn local_only(local: ChangePropagator) -> Self {
        Self::new(local, None)
    }
}

impl ChangeSink for BridgedChangeSink {
    fn publish(&self, event: MutationEvent) {
        if let Some(remote) = &self.remote {
            let remote = Arc::clone(remote);
            let event = event.clone();
            // Remote delivery must never hold up the mutation path
            tokio::spawn(async move {
                let post_id = event.post_id();
                if let Err(e) = remote.publish(event).await {
                    warn!(post_id = %post_id, error = %e, "Failed to publish change to Redis");
                }
            });
        }

        self.local.publish(event);
    }
}

/// Feed events from other instances into the local propagator only, so they
/// are never re-published.
pub async fn forward_remote_changes(
    subscriber: &EventSubscriber,
    local: ChangePropagator,
) -> ServiceResult<JoinHandle<()>> {
    let handle = subscriber
        .subscribe(move |event| local.publish(event))
        .await?;
    info!("Forwarding remote changes to local observers");
    Ok(handle)
}
