//! CLI command implementations.

pub mod inspect;
pub mod migrate;
pub mod repair;
pub mod unlink;
pub mod verify;

use notebridge_model::{DecodedState, SyncStateDocument};
use notebridge_storage::{FileStateStore, StateStore};
use std::error::Error;
use std::path::Path;

/// Opens a state file, taking its lock, and decodes it.
///
/// Fails while a sync process holds the file.
pub(crate) fn open_state(path: &Path) -> Result<(FileStateStore, DecodedState), Box<dyn Error>> {
    if !path.exists() {
        return Err(format!("No state file found at {:?}", path).into());
    }
    let store = FileStateStore::open(path)?;
    let bytes = store
        .read()?
        .ok_or_else(|| format!("State file {:?} is empty", path))?;
    let decoded = SyncStateDocument::decode(&bytes)?;
    Ok((store, decoded))
}

/// Writes a document through the store's atomic replace.
pub(crate) fn write_state(
    store: &FileStateStore,
    document: &SyncStateDocument,
) -> Result<(), Box<dyn Error>> {
    store.write_atomic(&document.encode()?)?;
    Ok(())
}
