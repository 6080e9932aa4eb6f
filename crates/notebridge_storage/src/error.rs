//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another process holds the state file lock.
    #[error("state file is locked by another process: {}", .0.display())]
    Locked(PathBuf),

    /// The state path cannot be used (e.g. it names a directory).
    #[error("invalid state path: {0}")]
    InvalidPath(String),

    /// A simulated or backend-reported write failure.
    #[error("write rejected: {0}")]
    WriteRejected(String),
}
