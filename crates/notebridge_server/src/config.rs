//! Server configuration.

use std::time::Duration;

/// Default pause between scheduled passes.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Configuration for the trigger service and scheduler.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Pause between scheduled passes.
    pub sync_interval: Duration,
    /// Whether the scheduler runs a pass as soon as it starts.
    pub run_on_start: bool,
}

impl ServerConfig {
    /// Creates a configuration with the default hourly interval.
    pub fn new() -> Self {
        Self {
            sync_interval: DEFAULT_SYNC_INTERVAL,
            run_on_start: true,
        }
    }

    /// Sets the interval between scheduled passes.
    ///
    /// Zero is raised to one millisecond.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Sets whether a pass runs immediately on start.
    pub fn with_run_on_start(mut self, run: bool) -> Self {
        self.run_on_start = run;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
