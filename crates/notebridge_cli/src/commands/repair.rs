//! Repair command implementation.

use super::{open_state, write_state};
use notebridge_model::{MappingEntry, MappingTable, SyncStateDocument};
use std::path::Path;
use tracing::info;

/// Runs the repair command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (store, decoded) = open_state(path)?;
    let (repaired, discarded) = repair(&decoded.document);

    if discarded.is_empty() && repaired.encode()? == decoded.document.encode()? {
        println!("✓ Nothing to repair.");
        return Ok(());
    }

    for entry in &discarded {
        println!(
            "  drop {} -> {}",
            entry.local_id,
            entry.remote().unwrap_or("-")
        );
    }

    if dry_run {
        println!(
            "Dry run - would drop {} entr{} and rewrite the remote index",
            discarded.len(),
            if discarded.len() == 1 { "y" } else { "ies" }
        );
        return Ok(());
    }

    write_state(&store, &repaired)?;
    info!(path = %path.display(), dropped = discarded.len(), "state repaired");
    println!(
        "✓ Repaired: {} entries kept, {} dropped",
        repaired.entries.len(),
        discarded.len()
    );
    Ok(())
}

/// Rebuilds a document so every remote id has exactly one entry.
///
/// The most recently synced claimant keeps a contested remote id; ties go
/// to the greater local id. Dropped local notes are treated as new on the
/// next pass and are normally re-linked by content.
pub fn repair(document: &SyncStateDocument) -> (SyncStateDocument, Vec<MappingEntry>) {
    let (table, discarded) = MappingTable::from_entries(document.keyed_entries());
    let repaired =
        SyncStateDocument::from_table(&table, document.last_sync_at, document.last_summary);
    (repaired, discarded)
}
