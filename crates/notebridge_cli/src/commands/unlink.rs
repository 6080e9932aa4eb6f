//! Unlink command implementation.

use super::{open_state, write_state};
use notebridge_model::SyncStateDocument;
use std::path::Path;
use tracing::info;

/// Runs the unlink command.
pub fn run(path: &Path, local_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let (store, decoded) = open_state(path)?;
    let mut document = decoded.document;

    let Some(remote_id) = unlink(&mut document, local_id) else {
        return Err(format!("No mapping entry for local note {}", local_id).into());
    };

    write_state(&store, &document)?;
    info!(local_id, remote_id = %remote_id, "entry removed");
    println!("✓ Unlinked {} from {}", local_id, remote_id);
    println!("  The pair will be matched again on the next pass if their content agrees.");
    Ok(())
}

/// Removes one entry and rebuilds the index.
///
/// Returns the remote id the entry pointed at, or `None` if there was no
/// such entry.
pub fn unlink(document: &mut SyncStateDocument, local_id: &str) -> Option<String> {
    let (mut table, _) = document.clone().into_table();
    let removed = table.remove(local_id)?;
    *document = SyncStateDocument::from_table(&table, document.last_sync_at, document.last_summary);
    Some(removed.remote().unwrap_or("-").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notebridge_model::{Fingerprint, MappingEntry, Timestamp};

    fn document() -> SyncStateDocument {
        let mut document = SyncStateDocument::default();
        for (local, remote) in [("a", "p1"), ("b", "p2")] {
            document.entries.insert(
                local.to_string(),
                MappingEntry::new(local, remote, Fingerprint::of("t", "b"), Timestamp::from("1")),
            );
        }
        document
    }

    #[test]
    fn removes_entry_and_index() {
        let mut doc = document();
        let removed = unlink(&mut doc, "a");
        assert_eq!(removed.as_deref(), Some("p1"));
        assert!(!doc.entries.contains_key("a"));
        assert!(!doc.remote_index.contains_key("p1"));
        assert_eq!(doc.remote_index.get("p2").map(String::as_str), Some("b"));
    }

    #[test]
    fn missing_entry_is_none() {
        let mut doc = document();
        assert!(unlink(&mut doc, "zzz").is_none());
        assert_eq!(doc.entries.len(), 2);
    }
}
