//! Conflict detection and resolution.
//!
//! A conflict arises when both sides of a linked pair changed since the
//! last pass and their contents differ. Identical edits on both sides are
//! not conflicts; the reconciler settles them without writing.

use crate::fingerprint::Fingerprint;
use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};

/// A pair that was edited on both sides since the last pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Local note id.
    pub local_id: String,
    /// Remote note id.
    pub remote_id: String,
    /// Fingerprint of the current local content.
    pub local_fingerprint: Fingerprint,
    /// Fingerprint of the current remote content.
    pub remote_fingerprint: Fingerprint,
    /// Local modification time, when known.
    pub local_modified: Option<Timestamp>,
    /// Remote modification time.
    pub remote_modified: Timestamp,
    /// Resolution (if any).
    pub resolution: Option<ConflictResolution>,
}

impl Conflict {
    /// Creates an unresolved conflict.
    pub fn new(
        local_id: impl Into<String>,
        remote_id: impl Into<String>,
        local_fingerprint: Fingerprint,
        remote_fingerprint: Fingerprint,
        local_modified: Option<Timestamp>,
        remote_modified: Timestamp,
    ) -> Self {
        Self {
            local_id: local_id.into(),
            remote_id: remote_id.into(),
            local_fingerprint,
            remote_fingerprint,
            local_modified,
            remote_modified,
            resolution: None,
        }
    }

    /// Returns true if both sides hold the same content.
    pub fn is_spurious(&self) -> bool {
        self.local_fingerprint == self.remote_fingerprint
    }

    /// Returns true if the remote modification time is strictly later than
    /// the local one. Unknown or unparsable times never count as later.
    pub fn remote_is_newer(&self) -> bool {
        let local = self.local_modified.as_ref().and_then(Timestamp::instant);
        match (self.remote_modified.instant(), local) {
            (Some(remote), Some(local)) => remote > local,
            _ => false,
        }
    }

    /// Resolves the conflict with the given resolution.
    pub fn resolve(&mut self, resolution: ConflictResolution) {
        self.resolution = Some(resolution);
    }

    /// Returns true if the conflict has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

/// Which side's content survives a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Local content is pushed to the remote note.
    KeepLocal,
    /// Remote content is written over the local note.
    AcceptRemote,
}

/// Conflict resolution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The strictly later modification wins; ties go to the local side.
    #[default]
    LastWriteWins,
    /// Remote always wins.
    RemoteWins,
    /// Local always wins.
    LocalWins,
}

impl ConflictPolicy {
    /// Resolves a conflict according to this policy.
    pub fn resolve(&self, conflict: &mut Conflict) {
        let resolution = match self {
            ConflictPolicy::LastWriteWins if conflict.remote_is_newer() => {
                ConflictResolution::AcceptRemote
            }
            ConflictPolicy::LastWriteWins => ConflictResolution::KeepLocal,
            ConflictPolicy::RemoteWins => ConflictResolution::AcceptRemote,
            ConflictPolicy::LocalWins => ConflictResolution::KeepLocal,
        };
        conflict.resolve(resolution);
    }
}

/// Which stores a pass may write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Writes flow both ways.
    #[default]
    Bidirectional,
    /// Only the remote store is written.
    LocalToRemote,
    /// Only the local store is written.
    RemoteToLocal,
}

impl SyncDirection {
    /// Returns true if the remote store may be written.
    pub fn writes_remote(&self) -> bool {
        !matches!(self, SyncDirection::RemoteToLocal)
    }

    /// Returns true if the local store may be written.
    pub fn writes_local(&self) -> bool {
        !matches!(self, SyncDirection::LocalToRemote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict(local_ts: Option<&str>, remote_ts: &str) -> Conflict {
        Conflict::new(
            "l1",
            "r1",
            Fingerprint::of("t", "local"),
            Fingerprint::of("t", "remote"),
            local_ts.map(Timestamp::from),
            Timestamp::from(remote_ts),
        )
    }

    #[test]
    fn spurious_when_fingerprints_match() {
        let mut c = conflict(None, "x");
        assert!(!c.is_spurious());
        c.remote_fingerprint = c.local_fingerprint.clone();
        assert!(c.is_spurious());
    }

    #[test]
    fn last_write_wins_remote_later() {
        let mut c = conflict(Some("1704096000"), "2024-01-01T09:00:00Z");
        ConflictPolicy::LastWriteWins.resolve(&mut c);
        assert_eq!(c.resolution, Some(ConflictResolution::AcceptRemote));
    }

    #[test]
    fn last_write_wins_local_later() {
        let mut c = conflict(Some("1704099600000000000"), "2024-01-01T08:30:00Z");
        ConflictPolicy::LastWriteWins.resolve(&mut c);
        assert_eq!(c.resolution, Some(ConflictResolution::KeepLocal));
    }

    #[test]
    fn tie_goes_to_local() {
        let mut c = conflict(Some("1704096000"), "2024-01-01T08:00:00Z");
        ConflictPolicy::LastWriteWins.resolve(&mut c);
        assert_eq!(c.resolution, Some(ConflictResolution::KeepLocal));
    }

    #[test]
    fn unknown_times_go_to_local() {
        let mut c = conflict(None, "2030-01-01T00:00:00Z");
        ConflictPolicy::LastWriteWins.resolve(&mut c);
        assert_eq!(c.resolution, Some(ConflictResolution::KeepLocal));

        let mut c = conflict(Some("1704096000"), "garbage");
        ConflictPolicy::LastWriteWins.resolve(&mut c);
        assert_eq!(c.resolution, Some(ConflictResolution::KeepLocal));
    }

    #[test]
    fn fixed_policies() {
        let mut c = conflict(Some("2030-01-01T00:00:00Z"), "2000-01-01T00:00:00Z");
        ConflictPolicy::RemoteWins.resolve(&mut c);
        assert_eq!(c.resolution, Some(ConflictResolution::AcceptRemote));

        let mut c = conflict(Some("2000-01-01T00:00:00Z"), "2030-01-01T00:00:00Z");
        ConflictPolicy::LocalWins.resolve(&mut c);
        assert!(c.is_resolved());
        assert_eq!(c.resolution, Some(ConflictResolution::KeepLocal));
    }

    #[test]
    fn direction_gates() {
        assert!(SyncDirection::Bidirectional.writes_local());
        assert!(SyncDirection::Bidirectional.writes_remote());
        assert!(!SyncDirection::LocalToRemote.writes_local());
        assert!(SyncDirection::LocalToRemote.writes_remote());
        assert!(SyncDirection::RemoteToLocal.writes_local());
        assert!(!SyncDirection::RemoteToLocal.writes_remote());
    }
}
