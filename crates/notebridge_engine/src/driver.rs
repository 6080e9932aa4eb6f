//! The sync driver.
//!
//! Runs one pass end to end: load the table, snapshot both stores,
//! reconcile, persist, report. Passes are serialized per driver; the file
//! state store's lock serializes them across processes.

use crate::adapter::{LocalAdapter, RemoteAdapter};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::mapping_store::{LoadedState, MappingStore};
use crate::reconciler::{Reconciler, Snapshot};
use crate::store::{DocumentStore, NoteStore};
use chrono::{DateTime, Utc};
use notebridge_model::{Conflict, PassCounts};
use notebridge_storage::StateStore;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// The current state of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    /// No pass has run yet.
    Idle,
    /// Loading the mapping table.
    Loading,
    /// Listing both stores.
    Snapshotting,
    /// Planning and executing actions.
    Reconciling,
    /// Saving the mapping table.
    Persisting,
    /// The last pass completed.
    Synced,
    /// The last pass failed or could not snapshot.
    Error,
}

impl DriverState {
    /// Returns true while a pass is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            DriverState::Loading
                | DriverState::Snapshotting
                | DriverState::Reconciling
                | DriverState::Persisting
        )
    }

    /// Returns true if a new pass may start.
    pub fn can_start_pass(&self) -> bool {
        !self.is_active()
    }
}

/// Cumulative statistics across passes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    /// Passes that reached the persist step.
    pub passes_completed: u64,
    /// Passes that failed or could not snapshot.
    pub passes_failed: u64,
    /// Counts summed over completed passes.
    pub totals: PassCounts,
    /// Completion time of the last completed pass.
    pub last_pass_at: Option<DateTime<Utc>>,
    /// Duration of the last completed pass.
    pub last_duration_ms: Option<u64>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PassOutcome {
    /// Every planned action ran.
    Completed,
    /// The pass stopped early; completed work was persisted.
    Cancelled,
    /// A store could not be listed; nothing was changed.
    SnapshotUnavailable {
        /// The listing error.
        reason: String,
    },
}

/// Result of one pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    /// How the pass ended.
    pub outcome: PassOutcome,
    /// Outcome counts.
    pub counts: PassCounts,
    /// Conflicts encountered, with their resolutions.
    pub conflicts: Vec<Conflict>,
    /// Mapping entries after the pass.
    pub mapped_pairs: usize,
    /// When the pass started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration.
    pub duration_ms: u64,
}

impl PassSummary {
    /// Notes created on either side.
    pub fn created(&self) -> u64 {
        self.counts.created()
    }

    /// Notes updated on either side.
    pub fn updated(&self) -> u64 {
        self.counts.updated()
    }

    /// Notes deleted or archived on either side.
    pub fn deleted(&self) -> u64 {
        self.counts.deleted()
    }

    /// Notes left alone.
    pub fn skipped(&self) -> u64 {
        self.counts.skipped
    }
}

/// Marks a pass as running; clears the running and cancel flags when the
/// pass ends, however it ends.
struct PassGuard<'a> {
    running: &'a AtomicBool,
    cancelled: &'a AtomicBool,
}

impl<'a> PassGuard<'a> {
    fn acquire(running: &'a AtomicBool, cancelled: &'a AtomicBool) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { running, cancelled })
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.cancelled.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Drives reconciliation passes between one document store and one note store.
pub struct SyncDriver<D: DocumentStore, N: NoteStore> {
    config: SyncConfig,
    remote: RemoteAdapter<D>,
    local: LocalAdapter<N>,
    mappings: MappingStore,
    state: RwLock<DriverState>,
    stats: RwLock<SyncStats>,
    running: AtomicBool,
    cancelled: AtomicBool,
}

impl<D: DocumentStore, N: NoteStore> SyncDriver<D, N> {
    /// Creates a driver.
    pub fn new(
        config: SyncConfig,
        documents: Arc<D>,
        notes: Arc<N>,
        state_store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            remote: RemoteAdapter::new(documents, &config),
            local: LocalAdapter::new(notes, &config),
            mappings: MappingStore::new(state_store),
            config,
            state: RwLock::new(DriverState::Idle),
            stats: RwLock::new(SyncStats::default()),
            running: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the current state.
    pub fn state(&self) -> DriverState {
        *self.state.read()
    }

    /// Gets the cumulative stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns true while a pass is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Asks the running pass to stop after its current action.
    ///
    /// Has no effect when no pass is running.
    pub fn cancel(&self) {
        if self.is_running() {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    /// Loads the persisted table without running a pass.
    pub fn load_state(&self) -> SyncResult<LoadedState> {
        self.mappings.load()
    }

    fn set_state(&self, state: DriverState) {
        *self.state.write() = state;
    }

    /// Runs one reconciliation pass.
    ///
    /// Returns [`SyncError::PassInProgress`] if a pass is already running.
    /// A store that cannot be listed does not fail the call: the summary
    /// reports [`PassOutcome::SnapshotUnavailable`] with zero changes and
    /// the persisted state is left as it was.
    pub fn run_sync_pass(&self) -> SyncResult<PassSummary> {
        let _guard = PassGuard::acquire(&self.running, &self.cancelled)
            .ok_or(SyncError::PassInProgress)?;
        let started_at = Utc::now();
        let start = Instant::now();

        self.set_state(DriverState::Loading);
        let loaded = self.mappings.load().map_err(|e| self.fail(e))?;
        let mut table = loaded.table;

        self.set_state(DriverState::Snapshotting);
        let snapshot = match self.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "snapshot unavailable, pass makes no changes");
                let reason = e.to_string();
                self.fail(e);
                return Ok(PassSummary {
                    outcome: PassOutcome::SnapshotUnavailable { reason },
                    counts: PassCounts::default(),
                    conflicts: Vec::new(),
                    mapped_pairs: table.len(),
                    started_at,
                    duration_ms: elapsed_ms(start),
                });
            }
        };

        self.set_state(DriverState::Reconciling);
        let report = Reconciler::new(&self.remote, &self.local, &self.config).reconcile(
            &snapshot,
            &mut table,
            &self.cancelled,
        );

        self.set_state(DriverState::Persisting);
        let finished_at = Utc::now();
        if let Err(e) = self.mappings.save(&mut table, Some(finished_at), Some(report.counts)) {
            error!(error = %e, "could not persist mapping table");
            return Err(self.fail(e));
        }

        let summary = PassSummary {
            outcome: if report.cancelled {
                PassOutcome::Cancelled
            } else {
                PassOutcome::Completed
            },
            counts: report.counts,
            conflicts: report.conflicts,
            mapped_pairs: table.len(),
            started_at,
            duration_ms: elapsed_ms(start),
        };

        info!(
            outcome = ?summary.outcome,
            created = summary.created(),
            updated = summary.updated(),
            deleted = summary.deleted(),
            linked = summary.counts.linked,
            skipped = summary.skipped(),
            conflicts = summary.counts.conflicts,
            mapped = summary.mapped_pairs,
            duration_ms = summary.duration_ms,
            "sync pass finished"
        );

        {
            let mut stats = self.stats.write();
            stats.passes_completed += 1;
            stats.totals.merge(&summary.counts);
            stats.last_pass_at = Some(finished_at);
            stats.last_duration_ms = Some(summary.duration_ms);
            stats.last_error = None;
        }
        self.set_state(DriverState::Synced);

        Ok(summary)
    }

    fn snapshot(&self) -> SyncResult<Snapshot> {
        let remote = self.remote.list_all()?;
        let local = self.local.list_all()?;
        Ok(Snapshot::new(remote, local))
    }

    /// Records a failed pass.
    fn fail(&self, error: SyncError) -> SyncError {
        self.set_state(DriverState::Error);
        let mut stats = self.stats.write();
        stats.passes_failed += 1;
        stats.last_error = Some(error.to_string());
        error
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::fake::{Fault, MemoryDocumentStore, MemoryNoteStore, StoreOperation};
    use notebridge_storage::InMemoryStateStore;
    use std::time::Duration;

    type Driver = SyncDriver<MemoryDocumentStore, MemoryNoteStore>;

    fn driver() -> (Arc<MemoryDocumentStore>, Arc<MemoryNoteStore>, Arc<InMemoryStateStore>, Driver) {
        let docs = Arc::new(MemoryDocumentStore::new());
        let notes = Arc::new(MemoryNoteStore::new());
        let state = Arc::new(InMemoryStateStore::new());
        let config = SyncConfig::new("owner").with_retry(RetryConfig::no_retry());
        let driver = SyncDriver::new(config, Arc::clone(&docs), Arc::clone(&notes), state.clone());
        (docs, notes, state, driver)
    }

    #[test]
    fn driver_state_checks() {
        assert!(DriverState::Idle.can_start_pass());
        assert!(DriverState::Synced.can_start_pass());
        assert!(DriverState::Error.can_start_pass());
        assert!(!DriverState::Reconciling.can_start_pass());
        assert!(DriverState::Persisting.is_active());
    }

    #[test]
    fn initial_state() {
        let (_, _, _, driver) = driver();
        assert_eq!(driver.state(), DriverState::Idle);
        assert_eq!(driver.stats().passes_completed, 0);
        assert!(!driver.is_running());
    }

    #[test]
    fn successful_pass_persists_state() {
        let (_, notes, state, driver) = driver();
        notes.insert_note("Plan", "draft v1");

        let summary = driver.run_sync_pass().unwrap();
        assert_eq!(summary.outcome, PassOutcome::Completed);
        assert_eq!(summary.created(), 1);
        assert_eq!(summary.mapped_pairs, 1);
        assert_eq!(driver.state(), DriverState::Synced);
        assert_eq!(state.write_count(), 1);

        let stats = driver.stats();
        assert_eq!(stats.passes_completed, 1);
        assert_eq!(stats.totals.created_remote, 1);
        assert!(stats.last_pass_at.is_some());

        let loaded = driver.load_state().unwrap();
        assert_eq!(loaded.table.len(), 1);
        assert_eq!(loaded.last_summary.unwrap().created_remote, 1);
    }

    #[test]
    fn listing_failure_reports_snapshot_unavailable() {
        let (docs, notes, state, driver) = driver();
        notes.insert_note("Plan", "draft v1");
        docs.fail(StoreOperation::ListDocuments, Fault::Fatal);

        let summary = driver.run_sync_pass().unwrap();
        assert!(matches!(summary.outcome, PassOutcome::SnapshotUnavailable { .. }));
        assert_eq!(summary.counts, PassCounts::default());
        assert_eq!(state.write_count(), 0);
        assert_eq!(driver.state(), DriverState::Error);
        assert_eq!(driver.stats().passes_failed, 1);
        assert_eq!(docs.write_calls(), 0);
    }

    #[test]
    fn save_failure_is_an_error() {
        let (_, notes, state, driver) = driver();
        notes.insert_note("Plan", "draft v1");
        state.set_fail_writes(true);

        assert!(matches!(driver.run_sync_pass(), Err(SyncError::Storage(_))));
        assert_eq!(driver.state(), DriverState::Error);
        assert!(driver.stats().last_error.is_some());
        assert!(!driver.is_running());
    }

    #[test]
    fn overlapping_pass_is_rejected() {
        let (docs, _, _, driver) = driver();
        let driver = Arc::new(driver);
        docs.fail(StoreOperation::ListDocuments, Fault::Delay(Duration::from_millis(300)));

        let background = {
            let driver = Arc::clone(&driver);
            std::thread::spawn(move || driver.run_sync_pass())
        };
        while !driver.is_running() {
            std::thread::yield_now();
        }
        assert!(matches!(driver.run_sync_pass(), Err(SyncError::PassInProgress)));
        assert!(background.join().unwrap().is_ok());
        assert!(!driver.is_running());
    }

    #[test]
    fn cancel_without_pass_is_ignored() {
        let (_, notes, _, driver) = driver();
        notes.insert_note("Plan", "draft v1");
        driver.cancel();
        let summary = driver.run_sync_pass().unwrap();
        assert_eq!(summary.outcome, PassOutcome::Completed);
        assert_eq!(summary.created(), 1);
    }

    #[test]
    fn cancelled_pass_persists_completed_work() {
        let (_, notes, state, driver) = driver();
        let driver = Arc::new(driver);
        for i in 0..5 {
            notes.insert_note(&format!("n{i}"), "body");
        }
        notes.fail_times(StoreOperation::ListNotes, Fault::Delay(Duration::from_millis(200)), 1);

        let background = {
            let driver = Arc::clone(&driver);
            std::thread::spawn(move || driver.run_sync_pass())
        };
        while !driver.is_running() {
            std::thread::yield_now();
        }
        driver.cancel();
        let summary = background.join().unwrap().unwrap();
        assert_eq!(summary.outcome, PassOutcome::Cancelled);
        assert_eq!(summary.counts.skipped, 5);
        assert_eq!(state.write_count(), 1);
    }
}
