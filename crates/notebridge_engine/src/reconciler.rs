//! The reconciliation algorithm.
//!
//! A pass is split into pure planning and effectful execution:
//!
//! 1. [`required_content`] decides which remote bodies are needed.
//! 2. The bodies are fetched with bounded parallelism.
//! 3. [`plan`] turns (snapshots, table, bodies) into an ordered list of
//!    [`SyncAction`]s in three phases: existing pairs, new local notes,
//!    new remote notes.
//! 4. [`Reconciler::execute`] runs the actions through the adapters and
//!    updates the table only after each write is confirmed.
//!
//! Notes referenced by any entry at the start of the pass never take part
//! in phases 2 and 3, so a note is never deleted and recreated in the same
//! pass, and a note created remotely in phase 2 cannot come back as a new
//! local note in phase 3.

use crate::adapter::{LocalAdapter, RemoteAdapter};
use crate::config::SyncConfig;
use crate::store::{DocumentStore, NoteStore};
use chrono::{DateTime, Utc};
use notebridge_model::{
    has_content, Conflict, ConflictPolicy, ConflictResolution, Fingerprint, LocalNote,
    MappingEntry, MappingTable, PassCounts, RemoteNote, SyncDirection, Timestamp,
};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Full listings of both stores taken at the start of a pass.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Every live remote note.
    pub remote: Vec<RemoteNote>,
    /// Every local note.
    pub local: Vec<LocalNote>,
}

impl Snapshot {
    /// Creates a snapshot.
    pub fn new(remote: Vec<RemoteNote>, local: Vec<LocalNote>) -> Self {
        Self { remote, local }
    }

    fn remote_by_id(&self) -> BTreeMap<&str, &RemoteNote> {
        self.remote.iter().map(|n| (n.id.as_str(), n)).collect()
    }

    fn local_by_id(&self) -> BTreeMap<&str, &LocalNote> {
        self.local.iter().map(|n| (n.id.as_str(), n)).collect()
    }
}

/// Why a note was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Neither side changed.
    Unchanged,
    /// The body is empty; the note is not ready to sync.
    EmptyContent,
    /// The remote body could not be fetched this pass.
    ContentUnavailable,
    /// The write would go to a store the direction keeps read-only.
    DirectionBlocked,
}

/// One step of a pass.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    /// Both sides are gone; drop the entry.
    Forget {
        /// Local id of the entry.
        local_id: String,
    },
    /// The local note was deleted; archive its remote counterpart.
    ArchiveRemote {
        /// Local id of the entry.
        local_id: String,
        /// Remote note to archive.
        remote_id: String,
    },
    /// The remote note was removed; delete its local counterpart.
    DeleteLocal {
        /// Local note to delete.
        local_id: String,
        /// Remote id of the entry.
        remote_id: String,
    },
    /// Write remote content over the local note.
    UpdateLocal {
        /// Local note to overwrite.
        local_id: String,
        /// Source remote note.
        remote_id: String,
        /// Folded title to write.
        title: String,
        /// Body to write.
        body: String,
        /// Fingerprint of the written content.
        fingerprint: Fingerprint,
        /// Remote modification time to record.
        remote_last_modified: Timestamp,
        /// The conflict this settles, if any.
        conflict: Option<Conflict>,
    },
    /// Write local content over the remote note.
    UpdateRemote {
        /// Source local note.
        local_id: String,
        /// Remote note to overwrite.
        remote_id: String,
        /// Plain title to write.
        title: String,
        /// Category to write.
        category: Option<String>,
        /// Body to write.
        body: String,
        /// Fingerprint of the written content.
        fingerprint: Fingerprint,
        /// Folded title, for the entry.
        folded_title: String,
        /// The conflict this settles, if any.
        conflict: Option<Conflict>,
    },
    /// Both sides already agree; record the new metadata without writing.
    Refresh {
        /// Local id of the entry.
        local_id: String,
        /// Remote id of the entry.
        remote_id: String,
        /// Fingerprint both sides share.
        fingerprint: Fingerprint,
        /// Remote modification time to record.
        remote_last_modified: Timestamp,
        /// Folded title.
        title: String,
    },
    /// Create a remote note for a new local note.
    CreateRemote {
        /// Source local note.
        local_id: String,
        /// Plain title.
        title: String,
        /// Category.
        category: Option<String>,
        /// Body.
        body: String,
        /// Fingerprint of the local content.
        fingerprint: Fingerprint,
        /// Folded title, for the entry.
        folded_title: String,
    },
    /// Create a local note for a new remote note.
    CreateLocal {
        /// Source remote note.
        remote_id: String,
        /// Folded title.
        title: String,
        /// Body.
        body: String,
        /// Remote modification time to record.
        remote_last_modified: Timestamp,
    },
    /// Link two unmapped notes that already hold the same content.
    Link {
        /// Local note.
        local_id: String,
        /// Remote note.
        remote_id: String,
        /// Shared fingerprint.
        fingerprint: Fingerprint,
        /// Remote modification time to record.
        remote_last_modified: Timestamp,
        /// Folded title.
        title: String,
    },
    /// Leave a note alone this pass.
    Skip {
        /// The local note, when known.
        local_id: Option<String>,
        /// The remote note, when known.
        remote_id: Option<String>,
        /// Why.
        reason: SkipReason,
    },
}

impl SyncAction {
    /// Returns true if executing the action writes to a store.
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            SyncAction::Forget { .. }
                | SyncAction::Refresh { .. }
                | SyncAction::Link { .. }
                | SyncAction::Skip { .. }
        )
    }

    /// The conflict this action settles, if any.
    pub fn conflict(&self) -> Option<&Conflict> {
        match self {
            SyncAction::UpdateLocal { conflict, .. } | SyncAction::UpdateRemote { conflict, .. } => {
                conflict.as_ref()
            }
            _ => None,
        }
    }
}

fn skip(local_id: Option<&str>, remote_id: Option<&str>, reason: SkipReason) -> SyncAction {
    SyncAction::Skip {
        local_id: local_id.map(str::to_string),
        remote_id: remote_id.map(str::to_string),
        reason,
    }
}

/// Returns the remote ids whose bodies [`plan`] needs, in id order.
pub fn required_content(snapshot: &Snapshot, table: &MappingTable, config: &SyncConfig) -> Vec<String> {
    let remotes = snapshot.remote_by_id();
    let locals: HashSet<&str> = snapshot.local.iter().map(|n| n.id.as_str()).collect();
    let mut ids = BTreeSet::new();

    for entry in table.entries() {
        let Some(remote) = entry.remote().and_then(|id| remotes.get(id)) else {
            continue;
        };
        if locals.contains(entry.local_id.as_str())
            && remote.last_modified != entry.remote_last_modified
        {
            ids.insert(remote.id.clone());
        }
    }

    if config.direction.writes_local() || config.adopt_identical {
        for id in remotes.keys() {
            if !table.contains_remote(id) {
                ids.insert((*id).to_string());
            }
        }
    }

    ids.into_iter().collect()
}

/// Computes the ordered actions for one pass.
pub fn plan(
    snapshot: &Snapshot,
    table: &MappingTable,
    contents: &BTreeMap<String, String>,
    config: &SyncConfig,
) -> Vec<SyncAction> {
    let remotes = snapshot.remote_by_id();
    let locals = snapshot.local_by_id();
    let direction = config.direction;
    let policy = config.effective_policy();

    let mut actions = Vec::new();
    let mut covered_local: HashSet<&str> = HashSet::new();
    let mut covered_remote: HashSet<&str> = HashSet::new();

    // Phase 1: existing pairs
    for entry in table.entries() {
        covered_local.insert(entry.local_id.as_str());
        let Some(remote_id) = entry.remote() else {
            continue;
        };
        covered_remote.insert(remote_id);

        let local = locals.get(entry.local_id.as_str()).copied();
        let remote = remotes.get(remote_id).copied();
        actions.push(match (local, remote) {
            (None, None) => SyncAction::Forget {
                local_id: entry.local_id.clone(),
            },
            (None, Some(_)) if direction.writes_remote() => SyncAction::ArchiveRemote {
                local_id: entry.local_id.clone(),
                remote_id: remote_id.to_string(),
            },
            (Some(_), None) if direction.writes_local() => SyncAction::DeleteLocal {
                local_id: entry.local_id.clone(),
                remote_id: remote_id.to_string(),
            },
            (None, Some(_)) | (Some(_), None) => skip(
                Some(&entry.local_id),
                Some(remote_id),
                SkipReason::DirectionBlocked,
            ),
            (Some(local), Some(remote)) => {
                plan_pair(entry, local, remote, contents, direction, policy)
            }
        });
    }

    // Phase 2: new local notes
    let unmapped_remotes: Vec<&RemoteNote> = remotes
        .values()
        .copied()
        .filter(|r| !covered_remote.contains(r.id.as_str()))
        .collect();

    let mut adoptable: BTreeMap<Fingerprint, VecDeque<&RemoteNote>> = BTreeMap::new();
    if config.adopt_identical {
        for &remote in &unmapped_remotes {
            if let Some(body) = contents.get(&remote.id).filter(|b| has_content(b)) {
                adoptable
                    .entry(remote.fingerprint(body))
                    .or_default()
                    .push_back(remote);
            }
        }
    }

    let mut linked_remote: HashSet<&str> = HashSet::new();
    for local in locals.values().filter(|l| !covered_local.contains(l.id.as_str())) {
        if !local.has_content() {
            actions.push(skip(Some(&local.id), None, SkipReason::EmptyContent));
            continue;
        }
        let fingerprint = local.fingerprint();

        if let Some(remote) = adoptable.get_mut(&fingerprint).and_then(VecDeque::pop_front) {
            linked_remote.insert(remote.id.as_str());
            actions.push(SyncAction::Link {
                local_id: local.id.clone(),
                remote_id: remote.id.clone(),
                fingerprint,
                remote_last_modified: remote.last_modified.clone(),
                title: local.title.clone(),
            });
        } else if direction.writes_remote() {
            let (category, title) = local.split_title();
            actions.push(SyncAction::CreateRemote {
                local_id: local.id.clone(),
                title,
                category,
                body: local.body.clone(),
                fingerprint,
                folded_title: local.title.clone(),
            });
        } else {
            actions.push(skip(Some(&local.id), None, SkipReason::DirectionBlocked));
        }
    }

    // Phase 3: new remote notes
    for remote in unmapped_remotes {
        if linked_remote.contains(remote.id.as_str()) {
            continue;
        }
        if !direction.writes_local() {
            actions.push(skip(None, Some(&remote.id), SkipReason::DirectionBlocked));
            continue;
        }
        actions.push(match contents.get(&remote.id) {
            None => skip(None, Some(&remote.id), SkipReason::ContentUnavailable),
            Some(body) if !has_content(body) => {
                skip(None, Some(&remote.id), SkipReason::EmptyContent)
            }
            Some(body) => SyncAction::CreateLocal {
                remote_id: remote.id.clone(),
                title: remote.folded_title(),
                body: body.clone(),
                remote_last_modified: remote.last_modified.clone(),
            },
        });
    }

    actions
}

/// Plans a pair present on both sides.
fn plan_pair(
    entry: &MappingEntry,
    local: &LocalNote,
    remote: &RemoteNote,
    contents: &BTreeMap<String, String>,
    direction: SyncDirection,
    policy: ConflictPolicy,
) -> SyncAction {
    let local_fp = local.fingerprint();
    let local_changed = local_fp != entry.local_fingerprint;
    let remote_changed = remote.last_modified != entry.remote_last_modified;

    if !remote_changed {
        return if local_changed {
            push_local(local, remote, local_fp, None, direction)
        } else {
            skip(Some(&local.id), Some(&remote.id), SkipReason::Unchanged)
        };
    }

    let body = match contents.get(&remote.id) {
        None => return skip(Some(&local.id), Some(&remote.id), SkipReason::ContentUnavailable),
        Some(body) if !has_content(body) => {
            return skip(Some(&local.id), Some(&remote.id), SkipReason::EmptyContent)
        }
        Some(body) => body,
    };
    let remote_fp = remote.fingerprint(body);

    // Same content on both sides: only the metadata moved.
    if remote_fp == local_fp {
        return SyncAction::Refresh {
            local_id: local.id.clone(),
            remote_id: remote.id.clone(),
            fingerprint: local_fp,
            remote_last_modified: remote.last_modified.clone(),
            title: local.title.clone(),
        };
    }

    if !local_changed {
        return pull_remote(local, remote, body, remote_fp, None, direction);
    }

    let mut conflict = Conflict::new(
        local.id.clone(),
        remote.id.clone(),
        local_fp.clone(),
        remote_fp.clone(),
        local.last_modified.clone(),
        remote.last_modified.clone(),
    );
    policy.resolve(&mut conflict);
    match conflict.resolution {
        Some(ConflictResolution::AcceptRemote) => {
            pull_remote(local, remote, body, remote_fp, Some(conflict), direction)
        }
        _ => push_local(local, remote, local_fp, Some(conflict), direction),
    }
}

fn push_local(
    local: &LocalNote,
    remote: &RemoteNote,
    fingerprint: Fingerprint,
    conflict: Option<Conflict>,
    direction: SyncDirection,
) -> SyncAction {
    if !direction.writes_remote() {
        return skip(Some(&local.id), Some(&remote.id), SkipReason::DirectionBlocked);
    }
    let (category, title) = local.split_title();
    SyncAction::UpdateRemote {
        local_id: local.id.clone(),
        remote_id: remote.id.clone(),
        title,
        category,
        body: local.body.clone(),
        fingerprint,
        folded_title: local.title.clone(),
        conflict,
    }
}

fn pull_remote(
    local: &LocalNote,
    remote: &RemoteNote,
    body: &str,
    fingerprint: Fingerprint,
    conflict: Option<Conflict>,
    direction: SyncDirection,
) -> SyncAction {
    if !direction.writes_local() {
        return skip(Some(&local.id), Some(&remote.id), SkipReason::DirectionBlocked);
    }
    SyncAction::UpdateLocal {
        local_id: local.id.clone(),
        remote_id: remote.id.clone(),
        title: remote.folded_title(),
        body: body.to_string(),
        fingerprint,
        remote_last_modified: remote.last_modified.clone(),
        conflict,
    }
}

/// What executing a plan did.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Outcome counts.
    pub counts: PassCounts,
    /// Conflicts encountered, with their resolutions.
    pub conflicts: Vec<Conflict>,
    /// True if the pass stopped early on request.
    pub cancelled: bool,
}

/// Runs plans against the two stores.
pub struct Reconciler<'a, D: DocumentStore, N: NoteStore> {
    remote: &'a RemoteAdapter<D>,
    local: &'a LocalAdapter<N>,
    config: &'a SyncConfig,
}

impl<'a, D: DocumentStore, N: NoteStore> Reconciler<'a, D, N> {
    /// Creates a reconciler over two adapters.
    pub fn new(remote: &'a RemoteAdapter<D>, local: &'a LocalAdapter<N>, config: &'a SyncConfig) -> Self {
        Self {
            remote,
            local,
            config,
        }
    }

    /// Plans and executes one pass over the given snapshot.
    pub fn reconcile(
        &self,
        snapshot: &Snapshot,
        table: &mut MappingTable,
        cancel: &AtomicBool,
    ) -> ReconcileReport {
        let needed = required_content(snapshot, table, self.config);
        let contents = self.remote.fetch_contents(&needed);
        debug!(requested = needed.len(), fetched = contents.len(), "fetched remote content");

        let actions = plan(snapshot, table, &contents, self.config);
        self.execute(actions, table, cancel)
    }

    /// Executes actions in order.
    ///
    /// An entry changes only after its write is confirmed. Failed writes
    /// count as skipped and leave the entry as it was. Once `cancel` is
    /// set, the remaining actions count as skipped.
    pub fn execute(
        &self,
        actions: Vec<SyncAction>,
        table: &mut MappingTable,
        cancel: &AtomicBool,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let now = Utc::now();

        for action in actions {
            if cancel.load(Ordering::SeqCst) {
                report.cancelled = true;
                report.counts.skipped += 1;
                continue;
            }
            if let Some(conflict) = action.conflict() {
                debug!(
                    local_id = %conflict.local_id,
                    remote_id = %conflict.remote_id,
                    resolution = ?conflict.resolution,
                    "conflict"
                );
                report.counts.conflicts += 1;
                report.conflicts.push(conflict.clone());
            }
            self.apply(action, table, &mut report.counts, now);
        }

        report
    }

    fn apply(&self, action: SyncAction, table: &mut MappingTable, counts: &mut PassCounts, now: DateTime<Utc>) {
        match action {
            SyncAction::Forget { local_id } => {
                debug!(local_id = %local_id, "both sides gone, forgetting pair");
                table.remove(&local_id);
            }
            SyncAction::ArchiveRemote {
                local_id,
                remote_id,
            } => {
                if self.remote.archive(&remote_id) {
                    debug!(local_id = %local_id, remote_id = %remote_id, "archived remote note");
                    table.remove(&local_id);
                    counts.deleted_remote += 1;
                } else {
                    counts.skipped += 1;
                }
            }
            SyncAction::DeleteLocal {
                local_id,
                remote_id,
            } => {
                if self.local.delete(&local_id) {
                    debug!(local_id = %local_id, remote_id = %remote_id, "deleted local note");
                    table.remove(&local_id);
                    counts.deleted_local += 1;
                } else {
                    counts.skipped += 1;
                }
            }
            SyncAction::UpdateLocal {
                local_id,
                remote_id,
                title,
                body,
                fingerprint,
                remote_last_modified,
                ..
            } => {
                if self.local.update(&local_id, &title, &body) {
                    debug!(local_id = %local_id, remote_id = %remote_id, "updated local note");
                    let entry = MappingEntry::new(local_id, remote_id, fingerprint, remote_last_modified)
                        .with_title(title)
                        .with_synced_at(now);
                    record(table, entry);
                    counts.updated_local += 1;
                } else {
                    counts.skipped += 1;
                }
            }
            SyncAction::UpdateRemote {
                local_id,
                remote_id,
                title,
                category,
                body,
                fingerprint,
                folded_title,
                ..
            } => match self.remote.update(&remote_id, &title, &body, category.as_deref()) {
                Some(last_modified) => {
                    debug!(local_id = %local_id, remote_id = %remote_id, "updated remote note");
                    let entry = MappingEntry::new(local_id, remote_id, fingerprint, last_modified)
                        .with_title(folded_title)
                        .with_synced_at(now);
                    record(table, entry);
                    counts.updated_remote += 1;
                }
                None => counts.skipped += 1,
            },
            SyncAction::Refresh {
                local_id,
                remote_id,
                fingerprint,
                remote_last_modified,
                title,
            } => {
                debug!(local_id = %local_id, remote_id = %remote_id, "content already in agreement");
                let entry = MappingEntry::new(local_id, remote_id, fingerprint, remote_last_modified)
                    .with_title(title)
                    .with_synced_at(now);
                record(table, entry);
                counts.skipped += 1;
            }
            SyncAction::CreateRemote {
                local_id,
                title,
                category,
                body,
                fingerprint,
                folded_title,
            } => match self.remote.create(&title, &body, category.as_deref()) {
                Some(created) => {
                    debug!(local_id = %local_id, remote_id = %created.id, "created remote note");
                    let entry = MappingEntry::new(local_id, created.id, fingerprint, created.last_modified)
                        .with_title(folded_title)
                        .with_synced_at(now);
                    record(table, entry);
                    counts.created_remote += 1;
                }
                None => counts.skipped += 1,
            },
            SyncAction::CreateLocal {
                remote_id,
                title,
                body,
                remote_last_modified,
            } => match self.local.create(&self.config.owner_id, &title, &body) {
                Some(local_id) => {
                    debug!(local_id = %local_id, remote_id = %remote_id, "created local note");
                    let fingerprint = Fingerprint::of(&title, &body);
                    let entry = MappingEntry::new(local_id, remote_id, fingerprint, remote_last_modified)
                        .with_title(title)
                        .with_synced_at(now);
                    record(table, entry);
                    counts.created_local += 1;
                }
                None => counts.skipped += 1,
            },
            SyncAction::Link {
                local_id,
                remote_id,
                fingerprint,
                remote_last_modified,
                title,
            } => {
                debug!(local_id = %local_id, remote_id = %remote_id, "linked identical notes");
                let entry = MappingEntry::new(local_id, remote_id, fingerprint, remote_last_modified)
                    .with_title(title)
                    .with_synced_at(now);
                if record(table, entry) {
                    counts.linked += 1;
                } else {
                    counts.skipped += 1;
                }
            }
            SyncAction::Skip {
                local_id,
                remote_id,
                reason,
            } => {
                debug!(?local_id, ?remote_id, ?reason, "skipped");
                counts.skipped += 1;
            }
        }
    }
}

fn record(table: &mut MappingTable, entry: MappingEntry) -> bool {
    let local_id = entry.local_id.clone();
    match table.insert(entry) {
        Ok(_) => true,
        Err(e) => {
            warn!(local_id = %local_id, error = %e, "could not record mapping entry");
            false
        }
    }
}
