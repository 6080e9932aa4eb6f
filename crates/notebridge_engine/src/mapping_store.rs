//! Loading and saving the mapping table.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use notebridge_model::{
    MappingTable, ModelError, PassCounts, StateFormat, SyncStateDocument,
};
use notebridge_storage::StateStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// The mapping table plus pass metadata, as loaded.
#[derive(Debug, Clone, Default)]
pub struct LoadedState {
    /// The mapping table.
    pub table: MappingTable,
    /// Completion time of the last successful pass.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Counts from the last successful pass.
    pub last_summary: Option<PassCounts>,
    /// Format found in storage; `None` when nothing was stored.
    pub format: Option<StateFormat>,
    /// Entries discarded while rebuilding the index.
    pub discarded: usize,
    /// True if the stored blob was unreadable and an empty table was used.
    pub recovered: bool,
}

/// Persists the mapping table through a [`StateStore`].
pub struct MappingStore {
    backend: Arc<dyn StateStore>,
}

impl MappingStore {
    /// Creates a mapping store over a backend.
    pub fn new(backend: Arc<dyn StateStore>) -> Self {
        Self { backend }
    }

    /// Describes the backend for logs.
    pub fn describe(&self) -> String {
        self.backend.describe()
    }

    /// Loads the table.
    ///
    /// Missing state yields an empty table. Unparsable state also yields an
    /// empty table, with a warning: the next pass then re-detects pairs by
    /// content instead of refusing to run. State written by a newer format
    /// is an error, since overwriting it would lose data.
    pub fn load(&self) -> SyncResult<LoadedState> {
        let Some(bytes) = self.backend.read()? else {
            debug!(backend = %self.describe(), "no stored state, starting empty");
            return Ok(LoadedState::default());
        };

        let decoded = match SyncStateDocument::decode(&bytes) {
            Ok(decoded) => decoded,
            Err(e @ ModelError::UnsupportedVersion { .. }) => return Err(SyncError::Model(e)),
            Err(e) => {
                warn!(
                    backend = %self.describe(),
                    error = %e,
                    "stored state is unreadable, starting from an empty table"
                );
                return Ok(LoadedState {
                    recovered: true,
                    ..LoadedState::default()
                });
            }
        };

        if decoded.format == StateFormat::Legacy {
            warn!(
                dropped = decoded.dropped_legacy,
                "imported legacy state; links will be re-verified on the next pass"
            );
        }

        let last_sync_at = decoded.document.last_sync_at;
        let last_summary = decoded.document.last_summary;
        let (table, discarded) = decoded.document.into_table();
        for entry in &discarded {
            warn!(
                local_id = %entry.local_id,
                remote_id = entry.remote_id.as_deref().unwrap_or("<none>"),
                "discarding mapping entry"
            );
        }

        Ok(LoadedState {
            table,
            last_sync_at,
            last_summary,
            format: Some(decoded.format),
            discarded: discarded.len(),
            recovered: false,
        })
    }

    /// Saves the table atomically.
    ///
    /// The reverse index is recomputed from the entries before writing.
    pub fn save(
        &self,
        table: &mut MappingTable,
        last_sync_at: Option<DateTime<Utc>>,
        last_summary: Option<PassCounts>,
    ) -> SyncResult<()> {
        for entry in table.rebuild_index() {
            warn!(
                local_id = %entry.local_id,
                remote_id = entry.remote_id.as_deref().unwrap_or("<none>"),
                "discarding mapping entry before save"
            );
        }
        let document = SyncStateDocument::from_table(table, last_sync_at, last_summary);
        self.backend.write_atomic(&document.encode()?)?;
        debug!(entries = table.len(), "saved mapping table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notebridge_model::{Fingerprint, MappingEntry, Timestamp};
    use notebridge_storage::InMemoryStateStore;

    fn entry(local: &str, remote: &str) -> MappingEntry {
        MappingEntry::new(local, remote, Fingerprint::of("t", "b"), Timestamp::from("ts"))
    }

    fn store() -> (Arc<InMemoryStateStore>, MappingStore) {
        let backend = Arc::new(InMemoryStateStore::new());
        let store = MappingStore::new(backend.clone());
        (backend, store)
    }

    #[test]
    fn empty_backend_loads_empty() {
        let (_, store) = store();
        let loaded = store.load().unwrap();
        assert!(loaded.table.is_empty());
        assert!(loaded.format.is_none());
        assert!(!loaded.recovered);
    }

    #[test]
    fn save_then_load() {
        let (backend, store) = store();
        let mut table = MappingTable::new();
        table.insert(entry("l1", "r1")).unwrap();
        let counts = PassCounts {
            created_remote: 1,
            ..PassCounts::default()
        };
        let now = Utc::now();
        store.save(&mut table, Some(now), Some(counts)).unwrap();
        assert_eq!(backend.write_count(), 1);

        let loaded = store.load().unwrap();
        assert_eq!(loaded.table, table);
        assert_eq!(loaded.last_sync_at, Some(now));
        assert_eq!(loaded.last_summary, Some(counts));
        assert_eq!(loaded.format, Some(StateFormat::Current));
    }

    #[test]
    fn corrupt_state_recovers_empty() {
        let backend = Arc::new(InMemoryStateStore::with_data(b"{ not json".to_vec()));
        let loaded = MappingStore::new(backend).load().unwrap();
        assert!(loaded.table.is_empty());
        assert!(loaded.recovered);
    }

    #[test]
    fn newer_version_is_an_error() {
        let backend = Arc::new(InMemoryStateStore::with_data(br#"{"version": 42}"#.to_vec()));
        assert!(matches!(
            MappingStore::new(backend).load(),
            Err(SyncError::Model(ModelError::UnsupportedVersion { .. }))
        ));
    }

    #[test]
    fn duplicate_claims_are_resolved_on_load() {
        let json = br#"{
            "version": 2,
            "entries": {
                "a": { "remote_id": "r1", "local_fingerprint": "", "remote_last_modified": "" },
                "b": { "remote_id": "r1", "local_fingerprint": "", "remote_last_modified": "",
                       "synced_at": "2024-01-01T00:00:00Z" }
            }
        }"#;
        let backend = Arc::new(InMemoryStateStore::with_data(json.to_vec()));
        let loaded = MappingStore::new(backend).load().unwrap();
        assert_eq!(loaded.discarded, 1);
        assert_eq!(loaded.table.get_by_remote("r1").unwrap().local_id, "b");
    }

    #[test]
    fn legacy_state_is_imported() {
        let json = br#"{"last_sync": null, "synced_notes": {"l1": "r1", "l2": "exists"}}"#;
        let backend = Arc::new(InMemoryStateStore::with_data(json.to_vec()));
        let loaded = MappingStore::new(backend).load().unwrap();
        assert_eq!(loaded.format, Some(StateFormat::Legacy));
        assert_eq!(loaded.table.len(), 1);
    }

    #[test]
    fn failed_write_keeps_previous_state() {
        let (backend, store) = store();
        let mut table = MappingTable::new();
        table.insert(entry("l1", "r1")).unwrap();
        store.save(&mut table, None, None).unwrap();

        backend.set_fail_writes(true);
        table.insert(entry("l2", "r2")).unwrap();
        assert!(matches!(
            store.save(&mut table, None, None),
            Err(SyncError::Storage(_))
        ));
        assert_eq!(store.load().unwrap().table.len(), 1);
    }
}
