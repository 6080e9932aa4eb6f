//! Request handling for "sync now" and "status".

use crate::error::{ServerError, ServerResult};
use chrono::{DateTime, Utc};
use notebridge_engine::{
    DocumentStore, DriverState, NoteStore, PassSummary, SyncDriver, SyncStats,
};
use notebridge_model::PassCounts;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// A request to the trigger service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServiceRequest {
    /// Run one pass now and report its summary.
    Sync,
    /// Report the persisted state and cumulative stats.
    Status,
}

/// Snapshot of the service for the status request.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Current driver state.
    pub state: DriverState,
    /// True while a pass is running.
    pub running: bool,
    /// Completion time of the last persisted pass.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Counts of the last persisted pass.
    pub last_summary: Option<PassCounts>,
    /// Number of mapped pairs, if the state could be read.
    pub mapped_pairs: Option<usize>,
    /// Why the state could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_error: Option<String>,
    /// Statistics since this process started.
    pub stats: SyncStats,
}

/// A reply from the trigger service.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceResponse {
    /// A pass ran.
    Synced {
        /// The pass summary.
        summary: PassSummary,
    },
    /// Current status.
    Status(StatusReport),
}

/// Handles trigger and status requests for one driver.
///
/// The service is transport-agnostic: an embedder routes its `/sync` and
/// `/status` endpoints to [`SyncService::handle`] or, with raw bodies, to
/// [`SyncService::handle_json`]. Sync requests block for the length of a
/// pass; async embedders should call them through `spawn_blocking`.
pub struct SyncService<D: DocumentStore, N: NoteStore> {
    driver: Arc<SyncDriver<D, N>>,
}

impl<D: DocumentStore, N: NoteStore> SyncService<D, N> {
    /// Creates a service over a driver.
    pub fn new(driver: Arc<SyncDriver<D, N>>) -> Self {
        Self { driver }
    }

    /// Returns the driver.
    pub fn driver(&self) -> &Arc<SyncDriver<D, N>> {
        &self.driver
    }

    /// Handles a request.
    pub fn handle(&self, request: ServiceRequest) -> ServerResult<ServiceResponse> {
        debug!(?request, "handling request");
        match request {
            ServiceRequest::Sync => self.sync().map(|summary| ServiceResponse::Synced { summary }),
            ServiceRequest::Status => Ok(ServiceResponse::Status(self.status())),
        }
    }

    /// Runs a pass now.
    pub fn sync(&self) -> ServerResult<PassSummary> {
        Ok(self.driver.run_sync_pass()?)
    }

    /// Builds the status report.
    pub fn status(&self) -> StatusReport {
        let (last_sync_at, last_summary, mapped_pairs, state_error) =
            match self.driver.load_state() {
                Ok(loaded) => (
                    loaded.last_sync_at,
                    loaded.last_summary,
                    Some(loaded.table.len()),
                    None,
                ),
                Err(e) => {
                    warn!(error = %e, "status could not read sync state");
                    (None, None, None, Some(e.to_string()))
                }
            };

        StatusReport {
            state: self.driver.state(),
            running: self.driver.is_running(),
            last_sync_at,
            last_summary,
            mapped_pairs,
            state_error,
            stats: self.driver.stats(),
        }
    }

    /// Handles a JSON request body and returns a status code and JSON reply.
    ///
    /// Errors are rendered as `{"error": "..."}` with a 4xx or 5xx code.
    pub fn handle_json(&self, body: &str) -> (u16, String) {
        let result = serde_json::from_str::<ServiceRequest>(body)
            .map_err(|e| ServerError::InvalidRequest(e.to_string()))
            .and_then(|request| self.handle(request))
            .and_then(|response| Ok(serde_json::to_string(&response)?));

        match result {
            Ok(json) => (200, json),
            Err(e) => {
                let body = serde_json::json!({ "error": e.to_string() }).to_string();
                (e.status_code(), body)
            }
        }
    }
}
