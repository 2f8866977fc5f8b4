//! Error types for the change-event bridge

use thiserror::Error;

/// Errors raised while publishing or receiving mutation events
#[derive(Error, Debug)]
pub enum EventError {
    /// Redis connection or operation error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Envelope serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unknown resource name or malformed payload
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}
