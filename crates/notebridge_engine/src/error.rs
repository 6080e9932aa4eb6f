//! Error types for the sync engine.

use notebridge_model::ModelError;
use notebridge_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A collaborator call exceeded the per-call timeout.
    #[error("{0} timed out")]
    Timeout(String),

    /// The collaborator rejected the request.
    #[error("server error: {0}")]
    ServerError(String),

    /// The record does not exist (or no longer exists) in the store.
    #[error("record not found: {id}")]
    NotFound {
        /// The missing record id.
        id: String,
    },

    /// Persisted state could not be read or written.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Persisted state could not be encoded or decoded.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// A pass is already running against this state.
    #[error("a sync pass is already in progress")]
    PassInProgress,

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// The collaborator replied with something malformed.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a not-found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout(_) => true,
            SyncError::ServerError(_) => true,
            _ => false,
        }
    }

    /// Returns true if the error means the record is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound { .. })
    }
}
