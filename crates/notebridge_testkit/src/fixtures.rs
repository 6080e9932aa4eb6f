//! Test fixtures and harness helpers.
//!
//! Provides a ready-wired driver over in-memory stores that share one
//! logical clock, so modification times on both sides are comparable.

use notebridge_engine::{
    MemoryDocumentStore, MemoryNoteStore, PassSummary, RetryConfig, SyncConfig, SyncDriver,
    TestClock,
};
use notebridge_model::{compose_title, SyncStateDocument};
use notebridge_storage::{FileStateStore, InMemoryStateStore, StateStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Owner id used for notes the harness creates locally.
pub const TEST_OWNER: &str = "test-owner";

/// A driver wired to in-memory stores.
pub struct SyncHarness {
    /// Clock shared by both stores.
    pub clock: Arc<TestClock>,
    /// The remote document store.
    pub docs: Arc<MemoryDocumentStore>,
    /// The local note store.
    pub notes: Arc<MemoryNoteStore>,
    /// Where the mapping table is persisted.
    pub state: Arc<dyn StateStore>,
    /// The driver under test.
    pub driver: SyncDriver<MemoryDocumentStore, MemoryNoteStore>,
    _temp_dir: Option<TempDir>,
}

/// A configuration with fast retries and small pages.
pub fn test_config() -> SyncConfig {
    SyncConfig::new(TEST_OWNER)
        .with_retry(
            RetryConfig::new(2)
                .with_initial_delay(Duration::from_millis(1))
                .without_jitter(),
        )
        .with_timeout(Duration::from_secs(5))
        .with_page_size(4)
}

impl SyncHarness {
    /// Creates a harness with in-memory state and [`test_config`].
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Creates a harness with in-memory state.
    pub fn with_config(config: SyncConfig) -> Self {
        Self::build(config, Arc::new(InMemoryStateStore::new()), None)
    }

    /// Creates a harness whose state lives in a temporary file.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStateStore::open(&temp_dir.path().join("sync_state.json"))
            .expect("Failed to open state file");
        Self::build(test_config(), Arc::new(store), Some(temp_dir))
    }

    fn build(config: SyncConfig, state: Arc<dyn StateStore>, temp_dir: Option<TempDir>) -> Self {
        let clock = Arc::new(TestClock::new());
        let docs = Arc::new(MemoryDocumentStore::with_clock(Arc::clone(&clock)));
        let notes = Arc::new(MemoryNoteStore::with_clock(Arc::clone(&clock)));
        let driver = SyncDriver::new(
            config,
            Arc::clone(&docs),
            Arc::clone(&notes),
            Arc::clone(&state),
        );
        Self {
            clock,
            docs,
            notes,
            state,
            driver,
            _temp_dir: temp_dir,
        }
    }

    /// Replaces the persisted state with an empty store, as after state loss.
    pub fn lose_state(&mut self) {
        let state: Arc<dyn StateStore> = Arc::new(InMemoryStateStore::new());
        self.driver = SyncDriver::new(
            self.driver.config().clone(),
            Arc::clone(&self.docs),
            Arc::clone(&self.notes),
            Arc::clone(&state),
        );
        self.state = state;
    }

    /// Runs a pass and panics if it errors.
    pub fn pass(&self) -> PassSummary {
        self.driver.run_sync_pass().expect("sync pass failed")
    }

    /// Decodes the persisted state.
    pub fn stored_state(&self) -> SyncStateDocument {
        let bytes = self
            .state
            .read()
            .expect("Failed to read state")
            .expect("No state persisted");
        SyncStateDocument::decode(&bytes)
            .expect("Failed to decode state")
            .document
    }

    /// Asserts both stores hold the same notes and every pair is mapped.
    pub fn assert_converged(&self) {
        let state = self.stored_state();
        let notes = self.notes.notes();
        let docs = self.docs.live_documents();

        assert_eq!(
            notes.len(),
            docs.len(),
            "local has {} notes, remote has {}",
            notes.len(),
            docs.len()
        );
        assert_eq!(state.entries.len(), notes.len(), "not every pair is mapped");

        for (local_id, note) in notes {
            let entry = state
                .entries
                .get(&local_id)
                .unwrap_or_else(|| panic!("local note {local_id} is not mapped"));
            let remote_id = entry.remote().expect("mapped entry without remote id");
            let doc = self
                .docs
                .document(remote_id)
                .filter(|d| !d.archived)
                .unwrap_or_else(|| panic!("remote note {remote_id} is missing"));

            assert_eq!(
                compose_title(doc.category.as_deref(), &doc.title),
                note.title,
                "titles differ for {local_id}"
            );
            assert_eq!(doc.body, note.body, "bodies differ for {local_id}");
        }
    }
}

impl Default for SyncHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test with a fresh in-memory harness.
pub fn with_harness<F, R>(f: F) -> R
where
    F: FnOnce(&SyncHarness) -> R,
{
    let harness = SyncHarness::new();
    f(&harness)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harness_syncs_both_ways() {
        with_harness(|h| {
            h.notes.insert_note("[Work] Plan", "draft");
            h.docs.insert_document("Ideas", Some("Home"), "lots");
            let summary = h.pass();
            assert_eq!(summary.created(), 2);
            h.assert_converged();
        });
    }

    #[test]
    fn file_harness_persists() {
        let h = SyncHarness::file();
        h.notes.insert_note("Plan", "draft");
        h.pass();
        assert_eq!(h.stored_state().entries.len(), 1);
    }

    #[test]
    fn lost_state_relinks() {
        let mut h = SyncHarness::new();
        h.notes.insert_note("Plan", "draft");
        h.pass();
        h.lose_state();
        let summary = h.pass();
        assert_eq!(summary.counts.linked, 1);
        assert_eq!(summary.counts.changes(), 0);
        h.assert_converged();
    }

    #[test]
    #[should_panic(expected = "bodies differ")]
    fn divergence_is_detected() {
        let h = SyncHarness::new();
        let id = h.notes.insert_note("Plan", "draft");
        h.pass();
        h.notes.edit_note(&id, "Plan", "changed");
        h.assert_converged();
    }
}
