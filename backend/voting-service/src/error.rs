/// Error types for voting-service
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;
use vote_events::EventError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Redis failures reach the service through the event bridge
    #[error("Event bridge error: {0}")]
    Events(#[from] EventError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Anonymous votes are rejected, never recorded
    #[error("Voter identity is required")]
    Unauthenticated,

    #[error("Not found: {0}")]
    NotFound(String),

    /// A conditional ledger write lost against a concurrent writer
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Safe for the caller to retry the whole command
    #[error("Temporarily unavailable: {0}")]
    Transient(String),
}

impl ServiceError {
    /// Whether repeating the same store operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Database(e) => !matches!(
                e,
                sqlx::Error::RowNotFound
                    | sqlx::Error::ColumnNotFound(_)
                    | sqlx::Error::ColumnDecode { .. }
                    | sqlx::Error::Decode(_)
                    | sqlx::Error::TypeNotFound { .. }
            ),
            ServiceError::Events(e) => matches!(e, EventError::Redis(_)),
            ServiceError::Conflict(_) | ServiceError::Transient(_) => true,
            ServiceError::InvalidInput(_)
            | ServiceError::Unauthenticated
            | ServiceError::NotFound(_) => false,
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::InvalidInput(errors.to_string())
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Database(_) | ServiceError::Events(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        HttpResponse::build(status).json(serde_json::json!({ "error": self.to_string() }))
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
