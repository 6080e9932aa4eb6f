//! # notebridge model
//!
//! Data model for the notebridge reconciliation engine.
//!
//! This crate provides:
//! - [`RemoteNote`] / [`LocalNote`] snapshots of the two stores
//! - [`Timestamp`] with cross-store instant normalization
//! - [`Fingerprint`] content digests used for change detection
//! - The `"[Category] Title"` convention ([`compose_title`], [`decompose_title`])
//! - [`MappingEntry`] / [`MappingTable`] with the derived reverse index
//! - [`SyncStateDocument`], the persisted form of the table
//! - [`ConflictPolicy`], [`SyncDirection`] and [`PassCounts`]
//!
//! This is a pure model crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod error;
mod fingerprint;
mod mapping;
mod note;
mod state;
mod summary;
mod timestamp;
mod title;

pub use conflict::{Conflict, ConflictPolicy, ConflictResolution, SyncDirection};
pub use error::{ModelError, ModelResult};
pub use fingerprint::{Fingerprint, FINGERPRINT_BYTES};
pub use mapping::{duplicate_remote_ids, MappingEntry, MappingTable};
pub use note::{has_content, LocalNote, RemoteNote};
pub use state::{DecodedState, StateFormat, SyncStateDocument, STATE_VERSION};
pub use summary::PassCounts;
pub use timestamp::Timestamp;
pub use title::{compose_title, decompose_title};
