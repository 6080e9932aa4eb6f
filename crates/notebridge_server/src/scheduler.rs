//! Periodic sync passes on a tokio interval.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::service::SyncService;
use notebridge_engine::{DocumentStore, NoteStore, PassOutcome, SyncError};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// What the scheduler did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    /// Passes that ran to completion or were cancelled.
    pub passes_run: u64,
    /// Ticks skipped because a pass was already running.
    pub ticks_skipped: u64,
    /// Passes that failed or could not snapshot.
    pub failures: u64,
}

/// Runs sync passes periodically until shut down.
///
/// Passes run on the blocking pool. A tick that finds a pass already
/// running (for example one triggered through [`SyncService`]) is skipped.
/// Shutdown during a pass cancels it cooperatively and waits for it to
/// persist.
pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<SchedulerReport>,
}

impl Scheduler {
    /// Starts the scheduler on the current tokio runtime.
    pub fn start<D: DocumentStore, N: NoteStore>(
        service: Arc<SyncService<D, N>>,
        config: &ServerConfig,
    ) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(service, config.clone(), rx));
        Self { shutdown, handle }
    }

    /// Returns true if the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops the loop and returns what it did.
    pub async fn shutdown(self) -> ServerResult<SchedulerReport> {
        // The loop may already have exited and dropped its receiver.
        let _ = self.shutdown.send(true);
        self.handle
            .await
            .map_err(|e| ServerError::Scheduler(format!("scheduler task failed: {e}")))
    }
}

async fn run_loop<D: DocumentStore, N: NoteStore>(
    service: Arc<SyncService<D, N>>,
    config: ServerConfig,
    mut rx: watch::Receiver<bool>,
) -> SchedulerReport {
    let mut report = SchedulerReport::default();
    let mut interval = tokio::time::interval(config.sync_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    if !config.run_on_start {
        // The first tick completes immediately.
        interval.tick().await;
    }

    info!(
        interval_secs = config.sync_interval.as_secs(),
        run_on_start = config.run_on_start,
        "scheduler started"
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if run_scheduled_pass(&service, &mut rx, &mut report).await {
                    break;
                }
            }
            changed = rx.changed() => {
                if changed.is_err() || *rx.borrow() {
                    break;
                }
            }
        }
    }

    info!(
        passes = report.passes_run,
        skipped = report.ticks_skipped,
        failures = report.failures,
        "scheduler stopped"
    );
    report
}

/// Runs one pass. Returns true if shutdown was requested meanwhile.
async fn run_scheduled_pass<D: DocumentStore, N: NoteStore>(
    service: &Arc<SyncService<D, N>>,
    rx: &mut watch::Receiver<bool>,
    report: &mut SchedulerReport,
) -> bool {
    if service.driver().is_running() {
        debug!("pass already running, skipping tick");
        report.ticks_skipped += 1;
        return false;
    }

    let worker = Arc::clone(service);
    let mut pass = tokio::task::spawn_blocking(move || worker.driver().run_sync_pass());

    let mut stopping = false;
    let joined = loop {
        tokio::select! {
            joined = &mut pass => break joined,
            changed = rx.changed(), if !stopping => {
                if changed.is_err() || *rx.borrow() {
                    info!("shutdown requested, cancelling running pass");
                    service.driver().cancel();
                    stopping = true;
                }
            }
        }
    };

    match joined {
        Ok(Ok(summary)) => match summary.outcome {
            PassOutcome::SnapshotUnavailable { reason } => {
                warn!(reason = %reason, "scheduled pass could not snapshot");
                report.failures += 1;
            }
            _ => report.passes_run += 1,
        },
        Ok(Err(SyncError::PassInProgress)) => {
            debug!("pass started elsewhere, skipping tick");
            report.ticks_skipped += 1;
        }
        Ok(Err(e)) => {
            error!(error = %e, "scheduled pass failed");
            report.failures += 1;
        }
        Err(e) => {
            error!(error = %e, "scheduled pass panicked");
            report.failures += 1;
        }
    }

    stopping
}
