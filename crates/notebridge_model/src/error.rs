//! Error types for the data model.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while building or decoding model values.
#[derive(Debug, Error)]
pub enum ModelError {
    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The state blob is not a recognizable state document.
    #[error("corrupt state: {0}")]
    Corrupt(String),

    /// The state blob was written by a newer format.
    #[error("unsupported state version {found}, newest known is {supported}")]
    UnsupportedVersion {
        /// Version found in the blob.
        found: u32,
        /// Newest version this build understands.
        supported: u32,
    },

    /// Inserting an entry would map two local notes onto one remote note.
    #[error("remote note {remote_id} is already linked to local note {existing_local_id}")]
    DuplicateRemote {
        /// The contested remote id.
        remote_id: String,
        /// The local id already holding it.
        existing_local_id: String,
    },
}
