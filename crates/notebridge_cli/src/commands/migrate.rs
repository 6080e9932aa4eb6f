//! Migrate command implementation.

use super::{open_state, write_state};
use notebridge_model::{StateFormat, SyncStateDocument, STATE_VERSION};
use std::path::Path;
use tracing::info;

/// Runs the migrate command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    info!("Migrating sync state {:?}", path);

    let (store, decoded) = open_state(path)?;
    if decoded.format == StateFormat::Current && decoded.document.version == STATE_VERSION {
        println!("✓ State is already in the current format (v{}).", STATE_VERSION);
        return Ok(());
    }

    let (migrated, discarded) = migrate(decoded.document);

    if dry_run {
        println!("Dry run - would rewrite as v{}:", STATE_VERSION);
        println!("  {} entries kept", migrated.entries.len());
        if decoded.dropped_legacy > 0 {
            println!("  {} legacy markers dropped", decoded.dropped_legacy);
        }
        if discarded > 0 {
            println!("  {} duplicate entries dropped", discarded);
        }
        return Ok(());
    }

    write_state(&store, &migrated)?;
    println!(
        "✓ Migrated to v{}: {} entries, {} legacy markers dropped",
        STATE_VERSION,
        migrated.entries.len(),
        decoded.dropped_legacy
    );
    Ok(())
}

/// Normalizes a decoded document to the current version.
///
/// Returns the document and the number of entries discarded while
/// rebuilding the index.
pub fn migrate(document: SyncStateDocument) -> (SyncStateDocument, usize) {
    let last_sync_at = document.last_sync_at;
    let last_summary = document.last_summary;
    let (table, discarded) = document.into_table();
    (
        SyncStateDocument::from_table(&table, last_sync_at, last_summary),
        discarded.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use notebridge_storage::{FileStateStore, StateStore};

    const LEGACY: &[u8] =
        br#"{"last_sync": "2024-01-01T00:00:00", "synced_notes": {"a": "p1", "b": "exists", "c": "p2"}}"#;

    #[test]
    fn legacy_file_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        FileStateStore::open(&path)
            .unwrap()
            .write_atomic(LEGACY)
            .unwrap();

        run(&path, true).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), LEGACY);

        run(&path, false).unwrap();
        let decoded = SyncStateDocument::decode(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(decoded.format, StateFormat::Current);
        assert_eq!(decoded.document.version, STATE_VERSION);
        assert_eq!(decoded.document.entries.len(), 2);
        assert_eq!(decoded.document.remote_index.len(), 2);
        assert!(decoded.document.last_sync_at.is_some());
    }

    #[test]
    fn current_file_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let bytes = SyncStateDocument::default().encode().unwrap();
        FileStateStore::open(&path)
            .unwrap()
            .write_atomic(&bytes)
            .unwrap();

        run(&path, false).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }
}
