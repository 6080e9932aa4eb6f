//! The persisted state document.
//!
//! Current format:
//!
//! ```json
//! {
//!   "version": 2,
//!   "last_sync_at": "2024-01-01T10:00:00Z",
//!   "last_summary": { "created_remote": 1, ... },
//!   "entries": { "<local_id>": { "remote_id": "...", "local_fingerprint": "...", ... } },
//!   "remote_index": { "<remote_id>": "<local_id>" }
//! }
//! ```
//!
//! `remote_index` is written for readers of the file but ignored on load.
//!
//! The legacy format, `{"last_sync": ..., "synced_notes": {local_id: remote_id}}`,
//! is still readable. Its `"exists"` markers carry no remote id and are
//! dropped; the remaining links are imported with an empty fingerprint and
//! an unknown timestamp, so the first pass treats them as changed on both
//! sides and settles them by content.

use crate::error::{ModelError, ModelResult};
use crate::fingerprint::Fingerprint;
use crate::mapping::{MappingEntry, MappingTable};
use crate::summary::PassCounts;
use crate::timestamp::Timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current state document version.
pub const STATE_VERSION: u32 = 2;

/// Marker the legacy format used for notes matched by title only.
const LEGACY_EXISTS_MARKER: &str = "exists";

/// Serialized form of the mapping table plus pass metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStateDocument {
    /// Format version.
    pub version: u32,
    /// Completion time of the last successful pass.
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Counts from the last successful pass.
    #[serde(default)]
    pub last_summary: Option<PassCounts>,
    /// Entries keyed by local id.
    #[serde(default)]
    pub entries: BTreeMap<String, MappingEntry>,
    /// Derived remote-to-local index.
    #[serde(default)]
    pub remote_index: BTreeMap<String, String>,
}

/// Which on-disk format a document was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFormat {
    /// The current versioned format.
    Current,
    /// The legacy `synced_notes` format.
    Legacy,
}

/// Result of decoding a state blob.
#[derive(Debug, Clone)]
pub struct DecodedState {
    /// The decoded document, in current form.
    pub document: SyncStateDocument,
    /// Format found on disk.
    pub format: StateFormat,
    /// Legacy entries dropped during import.
    pub dropped_legacy: usize,
}

#[derive(Deserialize)]
struct LegacyState {
    #[serde(default)]
    last_sync: Option<String>,
    #[serde(default)]
    synced_notes: BTreeMap<String, String>,
}

impl Default for SyncStateDocument {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            last_sync_at: None,
            last_summary: None,
            entries: BTreeMap::new(),
            remote_index: BTreeMap::new(),
        }
    }
}

impl SyncStateDocument {
    /// Captures a table and pass metadata.
    pub fn from_table(
        table: &MappingTable,
        last_sync_at: Option<DateTime<Utc>>,
        last_summary: Option<PassCounts>,
    ) -> Self {
        Self {
            version: STATE_VERSION,
            last_sync_at,
            last_summary,
            entries: table
                .entries()
                .map(|e| (e.local_id.clone(), e.clone()))
                .collect(),
            remote_index: table.remote_index().clone(),
        }
    }

    /// Converts into a table, rebuilding the index from the entries.
    ///
    /// Returns the entries discarded while doing so.
    pub fn into_table(self) -> (MappingTable, Vec<MappingEntry>) {
        MappingTable::from_entries(self.entries.into_iter().map(|(local_id, mut entry)| {
            entry.local_id = local_id;
            entry
        }))
    }

    /// Entries with their local ids filled in from the keys.
    pub fn keyed_entries(&self) -> Vec<MappingEntry> {
        self.entries
            .iter()
            .map(|(local_id, entry)| {
                let mut entry = entry.clone();
                entry.local_id = local_id.clone();
                entry
            })
            .collect()
    }

    /// Encodes as pretty-printed JSON.
    pub fn encode(&self) -> ModelResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Decodes a state blob in either the current or the legacy format.
    pub fn decode(bytes: &[u8]) -> ModelResult<DecodedState> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        let object = value
            .as_object()
            .ok_or_else(|| ModelError::Corrupt("state is not a JSON object".into()))?;

        if object.contains_key("version") {
            let document: SyncStateDocument = serde_json::from_value(value)?;
            if document.version > STATE_VERSION {
                return Err(ModelError::UnsupportedVersion {
                    found: document.version,
                    supported: STATE_VERSION,
                });
            }
            return Ok(DecodedState {
                document,
                format: StateFormat::Current,
                dropped_legacy: 0,
            });
        }

        if object.contains_key("synced_notes") {
            let legacy: LegacyState = serde_json::from_value(value)?;
            return Ok(Self::import_legacy(legacy));
        }

        Err(ModelError::Corrupt(
            "state has neither a version nor synced_notes".into(),
        ))
    }

    fn import_legacy(legacy: LegacyState) -> DecodedState {
        let total = legacy.synced_notes.len();
        let entries: BTreeMap<String, MappingEntry> = legacy
            .synced_notes
            .into_iter()
            .filter(|(_, remote)| !remote.is_empty() && remote != LEGACY_EXISTS_MARKER)
            .map(|(local_id, remote_id)| {
                let entry = MappingEntry::new(
                    local_id.clone(),
                    remote_id,
                    Fingerprint::empty(),
                    Timestamp::unknown(),
                );
                (local_id, entry)
            })
            .collect();

        let last_sync_at = legacy
            .last_sync
            .map(Timestamp::new)
            .and_then(|ts| ts.instant());

        DecodedState {
            dropped_legacy: total - entries.len(),
            document: SyncStateDocument {
                last_sync_at,
                entries,
                ..SyncStateDocument::default()
            },
            format: StateFormat::Legacy,
        }
    }
}
