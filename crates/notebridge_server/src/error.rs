//! Error types for the trigger service.

use notebridge_engine::SyncError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the trigger service.
#[derive(Error, Debug)]
pub enum ServerError {
    /// A request body could not be parsed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A pass is already running.
    #[error("a sync pass is already running")]
    Busy,

    /// The pass itself failed.
    #[error("sync failed: {0}")]
    Sync(SyncError),

    /// The scheduler is not running or already stopped.
    #[error("scheduler: {0}")]
    Scheduler(String),

    /// A response could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(self, ServerError::InvalidRequest(_) | ServerError::Busy)
    }

    /// Returns an HTTP-like status code for embedders.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) => 400,
            ServerError::Busy => 409,
            ServerError::Sync(_) | ServerError::Scheduler(_) | ServerError::Serialization(_) => {
                500
            }
        }
    }
}

impl From<SyncError> for ServerError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::PassInProgress => ServerError::Busy,
            other => ServerError::Sync(other),
        }
    }
}
