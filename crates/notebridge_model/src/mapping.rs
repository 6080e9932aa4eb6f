//! The mapping table linking local notes to remote notes.

use crate::error::{ModelError, ModelResult};
use crate::fingerprint::Fingerprint;
use crate::timestamp::Timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One link between a local note and a remote note.
///
/// The local id is the table key and is not serialized with the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Local note id.
    #[serde(skip)]
    pub local_id: String,
    /// Remote note id. `None` only in damaged state; such entries are
    /// treated as unlinked.
    pub remote_id: Option<String>,
    /// Fingerprint of the content last synchronized.
    pub local_fingerprint: Fingerprint,
    /// Remote modification time observed at last sync.
    pub remote_last_modified: Timestamp,
    /// Folded title at last sync, kept for diagnostics.
    #[serde(default)]
    pub last_known_title: String,
    /// When this entry was last written by a pass.
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
}

impl MappingEntry {
    /// Creates a linked entry.
    pub fn new(
        local_id: impl Into<String>,
        remote_id: impl Into<String>,
        local_fingerprint: Fingerprint,
        remote_last_modified: Timestamp,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            remote_id: Some(remote_id.into()),
            local_fingerprint,
            remote_last_modified,
            last_known_title: String::new(),
            synced_at: None,
        }
    }

    /// Sets the last known title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.last_known_title = title.into();
        self
    }

    /// Sets the sync time.
    #[must_use]
    pub fn with_synced_at(mut self, at: DateTime<Utc>) -> Self {
        self.synced_at = Some(at);
        self
    }

    /// Returns the remote id if the entry is linked.
    pub fn remote(&self) -> Option<&str> {
        self.remote_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Returns true if `self` should survive over `other` when both claim
    /// the same remote note. The most recently synced entry wins; ties are
    /// broken by the larger local id.
    pub fn outranks(&self, other: &MappingEntry) -> bool {
        (self.synced_at, &self.local_id) > (other.synced_at, &other.local_id)
    }
}

/// Groups local ids by the remote id they claim, keeping only remote ids
/// claimed more than once.
pub fn duplicate_remote_ids<'a>(
    entries: impl IntoIterator<Item = &'a MappingEntry>,
) -> BTreeMap<String, Vec<String>> {
    let mut claims: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in entries {
        if let Some(remote) = entry.remote() {
            claims
                .entry(remote.to_string())
                .or_default()
                .push(entry.local_id.clone());
        }
    }
    claims.retain(|_, locals| locals.len() > 1);
    claims
}

/// The set of mapping entries plus the derived remote-to-local index.
///
/// Every remote id appears in at most one entry; the index is rebuilt from
/// the entries and never trusted from storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    entries: BTreeMap<String, MappingEntry>,
    remote_index: BTreeMap<String, String>,
}

impl MappingTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from loose entries.
    ///
    /// Returns the table plus any entries discarded while enforcing the
    /// one-remote-per-entry rule.
    pub fn from_entries(entries: impl IntoIterator<Item = MappingEntry>) -> (Self, Vec<MappingEntry>) {
        let mut table = Self::new();
        for entry in entries {
            table.entries.insert(entry.local_id.clone(), entry);
        }
        let discarded = table.rebuild_index();
        (table, discarded)
    }

    /// Recomputes the remote index from the entries.
    ///
    /// Entries without a remote id, and entries losing a duplicate claim,
    /// are removed and returned.
    pub fn rebuild_index(&mut self) -> Vec<MappingEntry> {
        let mut winners: BTreeMap<String, String> = BTreeMap::new();
        let mut losers: Vec<String> = Vec::new();

        for (local_id, entry) in &self.entries {
            let Some(remote) = entry.remote() else {
                losers.push(local_id.clone());
                continue;
            };
            match winners.get(remote) {
                Some(current) if !entry.outranks(&self.entries[current]) => {
                    losers.push(local_id.clone());
                }
                Some(current) => {
                    losers.push(current.clone());
                    winners.insert(remote.to_string(), local_id.clone());
                }
                None => {
                    winners.insert(remote.to_string(), local_id.clone());
                }
            }
        }

        self.remote_index = winners;
        losers
            .into_iter()
            .filter_map(|local_id| self.entries.remove(&local_id))
            .collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up an entry by local id.
    pub fn get(&self, local_id: &str) -> Option<&MappingEntry> {
        self.entries.get(local_id)
    }

    /// Looks up an entry by remote id.
    pub fn get_by_remote(&self, remote_id: &str) -> Option<&MappingEntry> {
        self.remote_index
            .get(remote_id)
            .and_then(|local_id| self.entries.get(local_id))
    }

    /// Returns true if some entry claims this remote id.
    pub fn contains_remote(&self, remote_id: &str) -> bool {
        self.remote_index.contains_key(remote_id)
    }

    /// Inserts or replaces the entry for its local id.
    ///
    /// Fails if another local note already holds the entry's remote id, or
    /// if the entry has no remote id.
    pub fn insert(&mut self, entry: MappingEntry) -> ModelResult<Option<MappingEntry>> {
        let Some(remote) = entry.remote().map(str::to_string) else {
            return Err(ModelError::Corrupt(format!(
                "entry for local note {} has no remote id",
                entry.local_id
            )));
        };
        if let Some(existing) = self.remote_index.get(&remote) {
            if *existing != entry.local_id {
                return Err(ModelError::DuplicateRemote {
                    remote_id: remote,
                    existing_local_id: existing.clone(),
                });
            }
        }

        let previous = self.remove(&entry.local_id);
        self.remote_index.insert(remote, entry.local_id.clone());
        self.entries.insert(entry.local_id.clone(), entry);
        Ok(previous)
    }

    /// Removes the entry for a local id.
    pub fn remove(&mut self, local_id: &str) -> Option<MappingEntry> {
        let entry = self.entries.remove(local_id)?;
        if let Some(remote) = entry.remote() {
            if self.remote_index.get(remote).map(String::as_str) == Some(local_id) {
                self.remote_index.remove(remote);
            }
        }
        Some(entry)
    }

    /// Iterates entries in local-id order.
    pub fn entries(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.values()
    }

    /// The derived remote-to-local index.
    pub fn remote_index(&self) -> &BTreeMap<String, String> {
        &self.remote_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(local: &str, remote: &str) -> MappingEntry {
        MappingEntry::new(local, remote, Fingerprint::of("t", local), Timestamp::from("1"))
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn insert_and_lookup() {
        let mut table = MappingTable::new();
        table.insert(entry("l1", "r1")).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("l1").unwrap().remote(), Some("r1"));
        assert_eq!(table.get_by_remote("r1").unwrap().local_id, "l1");
        assert!(table.contains_remote("r1"));
    }

    #[test]
    fn insert_rejects_duplicate_remote() {
        let mut table = MappingTable::new();
        table.insert(entry("l1", "r1")).unwrap();
        let err = table.insert(entry("l2", "r1")).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateRemote { existing_local_id, .. } if existing_local_id == "l1"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn reinsert_moves_remote() {
        let mut table = MappingTable::new();
        table.insert(entry("l1", "r1")).unwrap();
        let previous = table.insert(entry("l1", "r2")).unwrap();
        assert_eq!(previous.unwrap().remote(), Some("r1"));
        assert!(!table.contains_remote("r1"));
        assert!(table.contains_remote("r2"));
    }

    #[test]
    fn remove_clears_index() {
        let mut table = MappingTable::new();
        table.insert(entry("l1", "r1")).unwrap();
        assert!(table.remove("l1").is_some());
        assert!(table.is_empty());
        assert!(table.get_by_remote("r1").is_none());
        assert!(table.remove("l1").is_none());
    }

    #[test]
    fn rebuild_keeps_most_recent_claim() {
        let older = entry("l2", "r1").with_synced_at(at(100));
        let newer = entry("l1", "r1").with_synced_at(at(200));
        let (table, discarded) = MappingTable::from_entries([older, newer]);
        assert_eq!(table.get_by_remote("r1").unwrap().local_id, "l1");
        assert_eq!(discarded.len(), 1);
        assert_eq!(discarded[0].local_id, "l2");
    }

    #[test]
    fn rebuild_tie_breaks_on_local_id() {
        let (table, discarded) =
            MappingTable::from_entries([entry("a", "r1"), entry("c", "r1"), entry("b", "r1")]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get_by_remote("r1").unwrap().local_id, "c");
        assert_eq!(discarded.len(), 2);
    }

    #[test]
    fn rebuild_drops_unlinked_entries() {
        let mut unlinked = entry("l1", "r1");
        unlinked.remote_id = None;
        let mut blank = entry("l2", "r2");
        blank.remote_id = Some(String::new());
        let (table, discarded) = MappingTable::from_entries([unlinked, blank, entry("l3", "r3")]);
        assert_eq!(table.len(), 1);
        assert_eq!(discarded.len(), 2);
    }

    #[test]
    fn insert_rejects_unlinked() {
        let mut unlinked = entry("l1", "r1");
        unlinked.remote_id = None;
        assert!(MappingTable::new().insert(unlinked).is_err());
    }

    #[test]
    fn duplicates_report() {
        let entries = [entry("a", "r1"), entry("b", "r1"), entry("c", "r2")];
        let dups = duplicate_remote_ids(entries.iter());
        assert_eq!(dups.len(), 1);
        assert_eq!(dups["r1"], vec!["a".to_string(), "b".to_string()]);
    }
}
