//! # notebridge storage
//!
//! Durable storage for the sync engine's persisted state blob.
//!
//! The sync engine keeps exactly one piece of durable memory: the mapping
//! table linking local notes to remote documents. This crate stores that
//! table as an **opaque blob** and guarantees that a reader only ever sees
//! the previous complete blob or the new complete blob, never a torn write.
//!
//! ## Design Principles
//!
//! - Stores are whole-blob (read everything, replace everything)
//! - No knowledge of the state document format
//! - Must be `Send + Sync`
//! - Replacement is atomic (write-to-temp, fsync, rename, fsync directory)
//!
//! ## Available Stores
//!
//! - [`InMemoryStateStore`] - For tests and ephemeral engines
//! - [`FileStateStore`] - Persistent, lock-protected file on disk
//!
//! ## Example
//!
//! ```rust
//! use notebridge_storage::{InMemoryStateStore, StateStore};
//!
//! let store = InMemoryStateStore::new();
//! assert!(store.read().unwrap().is_none());
//! store.write_atomic(b"{}").unwrap();
//! assert_eq!(store.read().unwrap().as_deref(), Some(&b"{}"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StateStore;
pub use error::{StorageError, StorageResult};
pub use file::FileStateStore;
pub use memory::InMemoryStateStore;
