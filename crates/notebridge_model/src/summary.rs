//! Per-pass outcome counts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Counts of what a reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassCounts {
    /// Remote notes created from local notes.
    pub created_remote: u64,
    /// Local notes created from remote notes.
    pub created_local: u64,
    /// Remote notes updated from local edits.
    pub updated_remote: u64,
    /// Local notes updated from remote edits.
    pub updated_local: u64,
    /// Remote notes archived after local deletion.
    pub deleted_remote: u64,
    /// Local notes deleted after remote removal.
    pub deleted_local: u64,
    /// Unmapped pairs linked because their content already matched.
    pub linked: u64,
    /// Notes examined that needed no write, or whose write failed.
    pub skipped: u64,
    /// Pairs edited on both sides since the last pass.
    pub conflicts: u64,
}

impl PassCounts {
    /// Notes created on either side.
    pub fn created(&self) -> u64 {
        self.created_remote + self.created_local
    }

    /// Notes updated on either side.
    pub fn updated(&self) -> u64 {
        self.updated_remote + self.updated_local
    }

    /// Notes deleted or archived on either side.
    pub fn deleted(&self) -> u64 {
        self.deleted_remote + self.deleted_local
    }

    /// Total writes performed against the stores.
    pub fn changes(&self) -> u64 {
        self.created() + self.updated() + self.deleted()
    }

    /// Adds another pass's counts into this one.
    pub fn merge(&mut self, other: &PassCounts) {
        self.created_remote += other.created_remote;
        self.created_local += other.created_local;
        self.updated_remote += other.updated_remote;
        self.updated_local += other.updated_local;
        self.deleted_remote += other.deleted_remote;
        self.deleted_local += other.deleted_local;
        self.linked += other.linked;
        self.skipped += other.skipped;
        self.conflicts += other.conflicts;
    }
}

impl fmt::Display for PassCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created={} updated={} deleted={} linked={} skipped={} conflicts={}",
            self.created(),
            self.updated(),
            self.deleted(),
            self.linked,
            self.skipped,
            self.conflicts
        )
    }
}
