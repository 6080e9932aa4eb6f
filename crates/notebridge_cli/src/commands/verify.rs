//! Verify command implementation.

use super::open_state;
use notebridge_model::{duplicate_remote_ids, MappingTable, StateFormat, SyncStateDocument};
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of entries checked.
    pub entries_checked: usize,
    /// Problems that make the file unsafe to sync from as is.
    pub errors: Vec<String>,
    /// Conditions the next pass settles on its own.
    pub warnings: Vec<String>,
}

impl VerifyResult {
    /// Returns true if no errors were found.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying sync state at {:?}", path);
    println!();

    let (_store, decoded) = open_state(path)?;
    let result = verify(&decoded.document, decoded.format);

    println!("Entries checked: {}", result.entries_checked);
    for warning in &result.warnings {
        println!("  warning: {}", warning);
    }
    for error in &result.errors {
        println!("  error: {}", error);
    }

    println!();
    if result.is_ok() {
        println!("✓ Sync state verification passed");
        Ok(())
    } else {
        println!("✗ Sync state verification failed");
        Err("Verification failed".into())
    }
}

/// Checks a decoded document.
pub fn verify(document: &SyncStateDocument, format: StateFormat) -> VerifyResult {
    let entries = document.keyed_entries();
    let mut result = VerifyResult {
        entries_checked: entries.len(),
        ..VerifyResult::default()
    };

    for (remote_id, locals) in duplicate_remote_ids(entries.iter()) {
        result.errors.push(format!(
            "remote note {} is claimed by {} local notes: {}",
            remote_id,
            locals.len(),
            locals.join(", ")
        ));
    }

    for entry in &entries {
        if entry.remote().is_none() {
            result
                .errors
                .push(format!("entry {} has no remote id", entry.local_id));
        }
        if entry.local_fingerprint.is_empty() {
            result.warnings.push(format!(
                "entry {} has no fingerprint yet; the next pass settles it by content",
                entry.local_id
            ));
        } else if !entry.local_fingerprint.is_well_formed() {
            result.errors.push(format!(
                "entry {} has a malformed fingerprint {:?}",
                entry.local_id,
                entry.local_fingerprint.as_str()
            ));
        }
    }

    match format {
        StateFormat::Legacy => result
            .warnings
            .push("legacy state format; run `notebridge migrate`".to_string()),
        StateFormat::Current => {
            let (table, _) = MappingTable::from_entries(entries);
            if table.remote_index() != &document.remote_index {
                result
                    .errors
                    .push("stored remote index does not match the entries".to_string());
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use notebridge_model::{Fingerprint, MappingEntry, Timestamp};

    fn document(entries: &[(&str, &str)]) -> SyncStateDocument {
        let mut document = SyncStateDocument::default();
        for (local, remote) in entries {
            let entry = MappingEntry::new(*local, *remote, Fingerprint::of("t", local), Timestamp::from("1"));
            document.entries.insert(local.to_string(), entry);
            document
                .remote_index
                .insert(remote.to_string(), local.to_string());
        }
        document
    }

    #[test]
    fn clean_document_passes() {
        let result = verify(&document(&[("a", "p1"), ("b", "p2")]), StateFormat::Current);
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(result.entries_checked, 2);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn duplicate_remote_ids_fail() {
        let doc = document(&[("a", "p1"), ("b", "p1")]);
        let result = verify(&doc, StateFormat::Current);
        assert!(!result.is_ok());
        assert!(result.errors.iter().any(|e| e.contains("claimed by 2")));
    }

    #[test]
    fn stale_index_fails() {
        let mut doc = document(&[("a", "p1")]);
        doc.remote_index.insert("p9".into(), "ghost".into());
        let result = verify(&doc, StateFormat::Current);
        assert!(result.errors.iter().any(|e| e.contains("remote index")));
    }

    #[test]
    fn malformed_fingerprint_fails() {
        let mut doc = document(&[("a", "p1")]);
        doc.entries.get_mut("a").unwrap().local_fingerprint = Fingerprint::from_stored("xyz");
        let result = verify(&doc, StateFormat::Current);
        assert!(result.errors.iter().any(|e| e.contains("malformed")));
    }

    #[test]
    fn legacy_import_only_warns() {
        let decoded =
            SyncStateDocument::decode(br#"{"synced_notes": {"a": "p1", "b": "p2"}}"#).unwrap();
        let result = verify(&decoded.document, decoded.format);
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(result.warnings.len(), 3);
    }
}
