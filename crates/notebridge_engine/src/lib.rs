//! # notebridge engine
//!
//! Bidirectional reconciliation between a remote document store and a
//! local note store.
//!
//! This crate provides:
//! - Collaborator contracts ([`DocumentStore`], [`NoteStore`])
//! - Adapters adding per-call timeouts, retry with backoff and pagination
//! - The [`MappingStore`] persisting the link table
//! - The three-phase reconciler ([`plan`] / [`Reconciler`])
//! - The [`SyncDriver`] running one pass end to end
//! - In-memory fakes with failure injection ([`MemoryDocumentStore`], [`MemoryNoteStore`])
//!
//! ## Pass structure
//!
//! 1. Load the mapping table (an unreadable table degrades to empty)
//! 2. List both stores in full (a failed listing ends the pass with no changes)
//! 3. Existing pairs: propagate edits, deletions and conflicts
//! 4. New local notes: link identical remote notes or create remote copies
//! 5. New remote notes: create local copies
//! 6. Save the table atomically and report counts
//!
//! ## Key Invariants
//!
//! - At most one entry per local id and per remote id
//! - An entry changes only after the store confirms the write
//! - A failing note is skipped, never the whole pass
//! - Running a pass twice without external edits writes nothing the second time
//!
//! ```
//! use notebridge_engine::{MemoryDocumentStore, MemoryNoteStore, SyncConfig, SyncDriver};
//! use notebridge_storage::InMemoryStateStore;
//! use std::sync::Arc;
//!
//! let docs = Arc::new(MemoryDocumentStore::new());
//! let notes = Arc::new(MemoryNoteStore::new());
//! notes.insert_note("Plan", "draft v1");
//!
//! let driver = SyncDriver::new(
//!     SyncConfig::new("owner"),
//!     docs.clone(),
//!     notes.clone(),
//!     Arc::new(InMemoryStateStore::new()),
//! );
//! let summary = driver.run_sync_pass().unwrap();
//! assert_eq!(summary.created(), 1);
//! assert_eq!(docs.live_count(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod config;
mod driver;
mod error;
mod fake;
mod mapping_store;
mod reconciler;
mod store;

pub use adapter::{
    call_with_timeout, with_retry, with_retry_if, CallPolicy, LocalAdapter, RemoteAdapter,
};
pub use config::{RetryConfig, SyncConfig};
pub use driver::{DriverState, PassOutcome, PassSummary, SyncDriver, SyncStats};
pub use error::{SyncError, SyncResult};
pub use fake::{
    Fault, MemoryDocumentStore, MemoryNoteStore, StoreOperation, StoredDocument, StoredNote,
    TestClock,
};
pub use mapping_store::{LoadedState, MappingStore};
pub use notebridge_model::{ConflictPolicy, SyncDirection};
pub use reconciler::{
    plan, required_content, ReconcileReport, Reconciler, SkipReason, Snapshot, SyncAction,
};
pub use store::{DocumentPage, DocumentRecord, DocumentStore, NoteStore};
