//! Redis Pub/Sub bridge carrying mutation events between service instances

use crate::{EventError, MutationEvent, Result};
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Wire envelope published on the events channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub message_id: String,
    /// Instance that committed the mutation
    pub origin: String,
    pub event: MutationEvent,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl EventEnvelope {
    pub fn new(origin: String, event: MutationEvent) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            origin,
            event,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn decode(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(EventError::from)
    }
}

/// Publishes locally committed mutations for other instances
#[derive(Clone)]
pub struct EventPublisher {
    client: ConnectionManager,
    channel: String,
    origin: String,
}

impl EventPublisher {
    /// Default Redis channel for vote/post mutations
    pub const DEFAULT_CHANNEL: &'static str = "votes:changes";

    pub async fn new(redis_url: &str, origin: String) -> Result<Self> {
        Self::with_channel(redis_url, origin, Self::DEFAULT_CHANNEL.to_string()).await
    }

    pub async fn with_channel(redis_url: &str, origin: String, channel: String) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            client: connection,
            channel,
            origin,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Publish a mutation
    ///
    /// Returns number of subscribers that received the message
    pub async fn publish(&self, event: MutationEvent) -> Result<usize> {
        let envelope = EventEnvelope::new(self.origin.clone(), event);
        let payload = serde_json::to_string(&envelope)?;

        let mut conn = self.client.clone();
        let receivers: usize = conn.publish(&self.channel, payload).await?;

        debug!(
            message_id = %envelope.message_id,
            post_id = %envelope.event.post_id(),
            receivers,
            channel = %self.channel,
            "Mutation event published"
        );

        Ok(receivers)
    }
}

/// Receives mutations committed by other instances
pub struct EventSubscriber {
    client: Client,
    channel: String,
    origin: String,
}

impl EventSubscriber {
    /// `origin` must match the local publisher's origin so self-echo is dropped
    pub async fn new(redis_url: &str, origin: String) -> Result<Self> {
        Self::with_channel(redis_url, origin, EventPublisher::DEFAULT_CHANNEL.to_string()).await
    }

    pub async fn with_channel(redis_url: &str, origin: String, channel: String) -> Result<Self> {
        let client = Client::open(redis_url)?;

        Ok(Self {
            client,
            channel,
            origin,
        })
    }

    /// Forward every remote mutation to `callback` from a background task
    pub async fn subscribe<F>(&self, callback: F) -> Result<JoinHandle<()>>
    where
        F: Fn(MutationEvent) + Send + Sync + 'static,
    {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;

        info!(channel = %self.channel, origin = %self.origin, "Subscribed to mutation events");

        let callback = Arc::new(callback);
        let origin = self.origin.clone();

        let handle = tokio::spawn(async move {
            let mut stream = pubsub.on_message();

            while let Some(msg) = stream.next().await {
                let payload = match msg.get_payload::<String>() {
                    Ok(p) => p,
                    Err(e) => {
                        error!(error = ?e, "Failed to get message payload");
                        continue;
                    }
                };

                let envelope = match EventEnvelope::decode(&payload) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        error!(error = %e, payload = %payload, "Failed to decode mutation event");
                        continue;
                    }
                };

                if envelope.origin == origin {
                    continue;
                }

                debug!(
                    message_id = %envelope.message_id,
                    origin = %envelope.origin,
                    post_id = %envelope.event.post_id(),
                    "Received remote mutation event"
                );

                callback(envelope.event);
            }

            warn!("Mutation event subscription ended");
        });

        Ok(handle)
    }
}
