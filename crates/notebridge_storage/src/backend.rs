//! State store trait definition.

use crate::error::StorageResult;

/// A durable home for one opaque state blob.
///
/// The sync engine serializes its mapping table into a blob and hands it to
/// a `StateStore` at the end of every pass. Stores do not interpret the
/// bytes.
///
/// # Invariants
///
/// - `read` returns exactly the bytes of the last successful `write_atomic`
/// - `write_atomic` either fully replaces the blob or leaves the previous
///   blob untouched; a crash mid-write never yields a partial blob
/// - Stores must be `Send + Sync` so a driver can be shared across threads
///
/// # Implementors
///
/// - [`super::InMemoryStateStore`] - For testing
/// - [`super::FileStateStore`] - For persistent storage
pub trait StateStore: Send + Sync {
    /// Reads the current blob.
    ///
    /// Returns `Ok(None)` when nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying medium cannot be read.
    fn read(&self) -> StorageResult<Option<Vec<u8>>>;

    /// Atomically replaces the blob with `data`.
    ///
    /// After this returns successfully, `data` survives process termination.
    ///
    /// # Errors
    ///
    /// Returns an error if the write, sync or rename fails. The previous blob
    /// is still intact in that case.
    fn write_atomic(&self, data: &[u8]) -> StorageResult<()>;

    /// Human-readable location of the blob, for logs and tooling.
    fn describe(&self) -> String;
}
