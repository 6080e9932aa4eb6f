//! In-memory state store for testing.

use crate::backend::StateStore;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// An in-memory state store.
///
/// Suitable for unit tests, integration tests and engines that do not need
/// to remember pairings across restarts.
///
/// Writes can be made to fail on demand to exercise persistence error paths.
///
/// # Example
///
/// ```rust
/// use notebridge_storage::{InMemoryStateStore, StateStore};
///
/// let store = InMemoryStateStore::with_data(b"seed".to_vec());
/// assert_eq!(store.read().unwrap().unwrap(), b"seed");
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    data: RwLock<Option<Vec<u8>>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl InMemoryStateStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with a pre-existing blob.
    ///
    /// Useful for testing recovery from corrupt or legacy state.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: RwLock::new(Some(data)),
            ..Self::default()
        }
    }

    /// Returns a copy of the current blob.
    #[must_use]
    pub fn data(&self) -> Option<Vec<u8>> {
        self.data.read().clone()
    }

    /// Number of successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Makes subsequent writes fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Discards the stored blob, simulating a lost state file.
    pub fn clear(&self) {
        *self.data.write() = None;
    }
}

impl StateStore for InMemoryStateStore {
    fn read(&self) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.read().clone())
    }

    fn write_atomic(&self, data: &[u8]) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteRejected("simulated write failure".into()));
        }
        *self.data.write() = Some(data.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
