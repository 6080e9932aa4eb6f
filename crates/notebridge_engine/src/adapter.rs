//! Typed adapters over the two collaborators.
//!
//! Adapters add what the raw collaborator contracts lack: a per-call
//! timeout, bounded retry with backoff for transient failures, pagination,
//! and title normalization. Listing failures propagate so the driver can
//! abandon the pass; every write and content fetch collapses to a typed
//! outcome (`Option` / `bool`) so one failing note never aborts the rest.

use crate::config::{RetryConfig, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::store::{DocumentRecord, DocumentStore, NoteStore};
use notebridge_model::{decompose_title, LocalNote, RemoteNote, Timestamp};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout and retry settings applied to every collaborator call.
#[derive(Debug, Clone)]
pub struct CallPolicy {
    /// Retry behavior for transient failures.
    pub retry: RetryConfig,
    /// Upper bound on a single call.
    pub timeout: Duration,
}

impl CallPolicy {
    /// Builds the policy from a sync configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            retry: config.retry.clone(),
            timeout: config.timeout,
        }
    }
}

/// Runs `call` on a worker thread and waits at most `timeout` for it.
///
/// A call that overruns is abandoned: its thread finishes in the
/// background and its result is dropped.
pub fn call_with_timeout<T, F>(timeout: Duration, operation: &str, call: F) -> SyncResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> SyncResult<T> + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    std::thread::Builder::new()
        .name(format!("notebridge-{operation}"))
        .spawn(move || {
            let _ = tx.send(call());
        })
        .map_err(|e| SyncError::transport_fatal(format!("cannot spawn {operation} worker: {e}")))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(SyncError::Timeout(operation.to_string())),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(SyncError::transport_fatal(format!(
            "{operation} worker exited without a result"
        ))),
    }
}

/// Runs `call` until it succeeds, fails permanently, or attempts run out.
pub fn with_retry<T>(
    retry: &RetryConfig,
    operation: &str,
    call: impl FnMut() -> SyncResult<T>,
) -> SyncResult<T> {
    with_retry_if(retry, operation, SyncError::is_retryable, call)
}

/// Like [`with_retry`], but only errors accepted by `retryable` are retried.
pub fn with_retry_if<T>(
    retry: &RetryConfig,
    operation: &str,
    retryable: impl Fn(&SyncError) -> bool,
    mut call: impl FnMut() -> SyncResult<T>,
) -> SyncResult<T> {
    let attempts = retry.attempts();
    let mut attempt = 0;
    loop {
        match call() {
            Ok(value) => return Ok(value),
            Err(e) if retryable(&e) && attempt + 1 < attempts => {
                attempt += 1;
                let delay = retry.delay_for_attempt(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying collaborator call"
                );
                std::thread::sleep(delay);
            }
            Err(e) => return Err(e),
        }
    }
}

fn guarded<S, T, F>(store: &Arc<S>, policy: &CallPolicy, operation: &'static str, call: F) -> SyncResult<T>
where
    S: Send + Sync + 'static + ?Sized,
    T: Send + 'static,
    F: Fn(&S) -> SyncResult<T> + Clone + Send + 'static,
{
    guarded_if(store, policy, operation, SyncError::is_retryable, call)
}

/// Guard for calls that create a record.
///
/// A timed-out create may still land after it is abandoned, so a timeout is
/// never retried. The next pass links the late record by content.
fn guarded_create<S, T, F>(store: &Arc<S>, policy: &CallPolicy, operation: &'static str, call: F) -> SyncResult<T>
where
    S: Send + Sync + 'static + ?Sized,
    T: Send + 'static,
    F: Fn(&S) -> SyncResult<T> + Clone + Send + 'static,
{
    guarded_if(
        store,
        policy,
        operation,
        |e: &SyncError| e.is_retryable() && !matches!(e, SyncError::Timeout(_)),
        call,
    )
}

fn guarded_if<S, T, F>(
    store: &Arc<S>,
    policy: &CallPolicy,
    operation: &'static str,
    retryable: impl Fn(&SyncError) -> bool,
    call: F,
) -> SyncResult<T>
where
    S: Send + Sync + 'static + ?Sized,
    T: Send + 'static,
    F: Fn(&S) -> SyncResult<T> + Clone + Send + 'static,
{
    with_retry_if(&policy.retry, operation, retryable, || {
        let store = Arc::clone(store);
        let call = call.clone();
        call_with_timeout(policy.timeout, operation, move || call(&*store))
    })
}

/// Normalizes a listed document: categories folded into the title are
/// split out when the store reports no separate category.
fn normalize(mut record: DocumentRecord) -> RemoteNote {
    let category = record
        .category
        .take()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    match category {
        Some(category) => record.category = Some(category),
        None => {
            let (category, title) = decompose_title(&record.title);
            record.category = category;
            record.title = title;
        }
    }
    record
}

/// Adapter over the remote document store.
pub struct RemoteAdapter<D: DocumentStore> {
    store: Arc<D>,
    policy: CallPolicy,
    page_size: usize,
    fetch_concurrency: usize,
}

impl<D: DocumentStore> RemoteAdapter<D> {
    /// Creates an adapter.
    pub fn new(store: Arc<D>, config: &SyncConfig) -> Self {
        Self {
            store,
            policy: CallPolicy::from_config(config),
            page_size: config.page_size.max(1),
            fetch_concurrency: config.fetch_concurrency.max(1),
        }
    }

    /// Lists every live remote note, following pagination to the end.
    ///
    /// Any page failing after retries fails the whole listing.
    pub fn list_all(&self) -> SyncResult<Vec<RemoteNote>> {
        let mut notes = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();

        loop {
            let page_cursor = cursor.clone();
            let page_size = self.page_size;
            let page = guarded(&self.store, &self.policy, "list_documents", move |s: &D| {
                s.list_documents(page_cursor.as_deref(), page_size)
            })?;

            notes.extend(page.documents.into_iter().map(normalize));

            match page.next_cursor {
                Some(next) if !seen.insert(next.clone()) => {
                    return Err(SyncError::Protocol(format!(
                        "document listing repeated cursor {next}"
                    )));
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        debug!(count = notes.len(), "listed remote notes");
        Ok(notes)
    }

    /// Fetches a document body. `None` means the fetch failed.
    pub fn get_content(&self, id: &str) -> Option<String> {
        let owned = id.to_string();
        match guarded(&self.store, &self.policy, "get_document_content", move |s: &D| {
            s.get_document_content(&owned)
        }) {
            Ok(content) => Some(content),
            Err(e) => {
                warn!(remote_id = %id, error = %e, "content fetch failed");
                None
            }
        }
    }

    /// Fetches many bodies with bounded parallelism.
    ///
    /// Failed fetches are absent from the result.
    pub fn fetch_contents(&self, ids: &[String]) -> BTreeMap<String, String> {
        let workers = self.fetch_concurrency.min(ids.len());
        if workers == 0 {
            return BTreeMap::new();
        }

        let next = AtomicUsize::new(0);
        let results = Mutex::new(BTreeMap::new());
        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(id) = ids.get(index) else {
                        break;
                    };
                    if let Some(content) = self.get_content(id) {
                        results.lock().insert(id.clone(), content);
                    }
                });
            }
        });
        results.into_inner()
    }

    /// Creates a document. `None` means the write failed.
    pub fn create(&self, title: &str, body: &str, category: Option<&str>) -> Option<RemoteNote> {
        let (t, b, c) = (title.to_string(), body.to_string(), category.map(str::to_string));
        match guarded_create(&self.store, &self.policy, "create_document", move |s: &D| {
            s.create_document(&t, &b, c.as_deref())
        }) {
            Ok(record) => Some(normalize(record)),
            Err(e) => {
                warn!(title = %title, error = %e, "remote create failed");
                None
            }
        }
    }

    /// Updates a document and returns its post-write modification time.
    pub fn update(&self, id: &str, title: &str, body: &str, category: Option<&str>) -> Option<Timestamp> {
        let (i, t, b, c) = (
            id.to_string(),
            title.to_string(),
            body.to_string(),
            category.map(str::to_string),
        );
        match guarded(&self.store, &self.policy, "update_document", move |s: &D| {
            s.update_document(&i, &t, &b, c.as_deref())
        }) {
            Ok(record) => Some(record.last_modified),
            Err(e) => {
                warn!(remote_id = %id, error = %e, "remote update failed");
                None
            }
        }
    }

    /// Archives a document. A document that is already gone counts as archived.
    pub fn archive(&self, id: &str) -> bool {
        let owned = id.to_string();
        match guarded(&self.store, &self.policy, "archive_document", move |s: &D| {
            s.archive_document(&owned)
        }) {
            Ok(()) => true,
            Err(e) if e.is_not_found() => {
                debug!(remote_id = %id, "document already gone");
                true
            }
            Err(e) => {
                warn!(remote_id = %id, error = %e, "remote archive failed");
                false
            }
        }
    }
}

/// Adapter over the local note store.
pub struct LocalAdapter<N: NoteStore> {
    store: Arc<N>,
    policy: CallPolicy,
}

impl<N: NoteStore> LocalAdapter<N> {
    /// Creates an adapter.
    pub fn new(store: Arc<N>, config: &SyncConfig) -> Self {
        Self {
            store,
            policy: CallPolicy::from_config(config),
        }
    }

    /// Lists every local note.
    pub fn list_all(&self) -> SyncResult<Vec<LocalNote>> {
        let notes = guarded(&self.store, &self.policy, "list_notes", |s: &N| s.list_notes())?;
        debug!(count = notes.len(), "listed local notes");
        Ok(notes)
    }

    /// Creates a note. `None` means the write failed.
    pub fn create(&self, owner_id: &str, title: &str, body: &str) -> Option<String> {
        let (o, t, b) = (owner_id.to_string(), title.to_string(), body.to_string());
        match guarded_create(&self.store, &self.policy, "create_note", move |s: &N| {
            s.create_note(&o, &t, &b)
        }) {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(title = %title, error = %e, "local create failed");
                None
            }
        }
    }

    /// Updates a note.
    pub fn update(&self, id: &str, title: &str, body: &str) -> bool {
        let (i, t, b) = (id.to_string(), title.to_string(), body.to_string());
        match guarded(&self.store, &self.policy, "update_note", move |s: &N| {
            s.update_note(&i, &t, &b)
        }) {
            Ok(()) => true,
            Err(e) => {
                warn!(local_id = %id, error = %e, "local update failed");
                false
            }
        }
    }

    /// Deletes a note. A note that is already gone counts as deleted.
    pub fn delete(&self, id: &str) -> bool {
        let owned = id.to_string();
        match guarded(&self.store, &self.policy, "delete_note", move |s: &N| {
            s.delete_note(&owned)
        }) {
            Ok(()) => true,
            Err(e) if e.is_not_found() => {
                debug!(local_id = %id, "note already gone");
                true
            }
            Err(e) => {
                warn!(local_id = %id, error = %e, "local delete failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{Fault, MemoryDocumentStore, MemoryNoteStore, StoreOperation};

    fn config() -> SyncConfig {
        SyncConfig::new("owner")
            .with_retry(
                RetryConfig::new(3)
                    .with_initial_delay(Duration::from_millis(1))
                    .without_jitter(),
            )
            .with_timeout(Duration::from_millis(500))
            .with_page_size(2)
    }

    fn remote() -> (Arc<MemoryDocumentStore>, RemoteAdapter<MemoryDocumentStore>) {
        let store = Arc::new(MemoryDocumentStore::new());
        let adapter = RemoteAdapter::new(Arc::clone(&store), &config());
        (store, adapter)
    }

    #[test]
    fn lists_all_pages() {
        let (store, adapter) = remote();
        for i in 0..5 {
            store.insert_document(&format!("doc {i}"), None, "body");
        }
        let notes = adapter.list_all().unwrap();
        assert_eq!(notes.len(), 5);
        assert_eq!(store.calls(StoreOperation::ListDocuments), 3);
    }

    #[test]
    fn listing_failure_aborts() {
        let (store, adapter) = remote();
        for i in 0..5 {
            store.insert_document(&format!("doc {i}"), None, "body");
        }
        store.fail(StoreOperation::ListDocuments, Fault::Fatal);
        assert!(adapter.list_all().is_err());
    }

    #[test]
    fn repeated_cursor_is_protocol_error() {
        let (store, adapter) = remote();
        for i in 0..5 {
            store.insert_document(&format!("doc {i}"), None, "body");
        }
        store.set_stuck_cursor(true);
        assert!(matches!(adapter.list_all(), Err(SyncError::Protocol(_))));
    }

    #[test]
    fn transient_failures_are_retried() {
        let (store, adapter) = remote();
        let id = store.insert_document("t", None, "body");
        store.fail_times(StoreOperation::GetContent, Fault::Transient, 2);
        assert_eq!(adapter.get_content(&id).as_deref(), Some("body"));
        assert_eq!(store.calls(StoreOperation::GetContent), 3);
    }

    #[test]
    fn retries_are_bounded() {
        let (store, adapter) = remote();
        let id = store.insert_document("t", None, "body");
        store.fail(StoreOperation::GetContent, Fault::Transient);
        assert_eq!(adapter.get_content(&id), None);
        assert_eq!(store.calls(StoreOperation::GetContent), 3);
    }

    #[test]
    fn fatal_failures_are_not_retried() {
        let (store, adapter) = remote();
        store.fail(StoreOperation::CreateDocument, Fault::Fatal);
        assert!(adapter.create("t", "b", None).is_none());
        assert_eq!(store.calls(StoreOperation::CreateDocument), 1);
    }

    #[test]
    fn slow_calls_time_out() {
        let store = Arc::new(MemoryDocumentStore::new());
        let adapter = RemoteAdapter::new(
            Arc::clone(&store),
            &config()
                .with_retry(RetryConfig::no_retry())
                .with_timeout(Duration::from_millis(20)),
        );
        let id = store.insert_document("t", None, "body");
        store.fail(StoreOperation::GetContent, Fault::Delay(Duration::from_millis(300)));
        assert_eq!(adapter.get_content(&id), None);
    }

    #[test]
    fn timeout_error_kind() {
        let result: SyncResult<()> = call_with_timeout(Duration::from_millis(10), "slow", || {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        });
        assert!(matches!(result, Err(SyncError::Timeout(op)) if op == "slow"));
    }

    #[test]
    fn panicking_call_is_fatal() {
        let result: SyncResult<()> =
            call_with_timeout(Duration::from_secs(1), "boom", || panic!("collaborator bug"));
        assert!(matches!(result, Err(SyncError::Transport { retryable: false, .. })));
    }

    #[test]
    fn timed_out_create_is_not_retried() {
        let store = Arc::new(MemoryDocumentStore::new());
        let adapter = RemoteAdapter::new(
            Arc::clone(&store),
            &config().with_timeout(Duration::from_millis(20)),
        );
        store.fail_times(StoreOperation::CreateDocument, Fault::Delay(Duration::from_millis(100)), 1);
        assert!(adapter.create("t", "b", None).is_none());
        assert_eq!(store.calls(StoreOperation::CreateDocument), 1);

        std::thread::sleep(Duration::from_millis(250));
        assert_eq!(store.live_count(), 1);
    }

    #[test]
    fn transient_create_failures_are_retried() {
        let (store, adapter) = remote();
        store.fail_times(StoreOperation::CreateDocument, Fault::Transient, 1);
        assert!(adapter.create("t", "b", None).is_some());
        assert_eq!(store.calls(StoreOperation::CreateDocument), 2);
        assert_eq!(store.live_count(), 1);
    }

    #[test]
    fn timed_out_local_create_is_not_retried() {
        let store = Arc::new(MemoryNoteStore::new());
        let adapter = LocalAdapter::new(
            Arc::clone(&store),
            &config().with_timeout(Duration::from_millis(20)),
        );
        store.fail_times(StoreOperation::CreateNote, Fault::Delay(Duration::from_millis(100)), 1);
        assert!(adapter.create("owner", "t", "b").is_none());
        assert_eq!(store.calls(StoreOperation::CreateNote), 1);
    }

    #[test]
    fn archive_of_missing_document_succeeds() {
        let (_store, adapter) = remote();
        assert!(adapter.archive("page-9999"));
    }

    #[test]
    fn folded_titles_are_decomposed() {
        let (store, adapter) = remote();
        store.set_fold_titles(true);
        store.insert_document("Plan", Some("Work"), "body");
        let notes = adapter.list_all().unwrap();
        assert_eq!(notes[0].title, "Plan");
        assert_eq!(notes[0].category.as_deref(), Some("Work"));
    }

    #[test]
    fn update_reports_post_write_timestamp() {
        let (store, adapter) = remote();
        let id = store.insert_document("t", None, "v1");
        let before = store.document(&id).unwrap().last_modified;
        let after = adapter.update(&id, "t", "v2", None).unwrap();
        assert_ne!(before, after);
        assert_eq!(store.document(&id).unwrap().last_modified, after);
    }

    #[test]
    fn fetch_contents_in_parallel() {
        let (store, adapter) = remote();
        let mut ids: Vec<String> = (0..10)
            .map(|i| store.insert_document(&format!("d{i}"), None, &format!("body {i}")))
            .collect();
        store.fail_id(StoreOperation::GetContent, &ids[3], Fault::Fatal);
        ids.push("page-missing".into());

        let contents = adapter.fetch_contents(&ids);
        assert_eq!(contents.len(), 9);
        assert_eq!(contents[&ids[0]], "body 0");
        assert!(!contents.contains_key(&ids[3]));
    }

    #[test]
    fn local_adapter_outcomes() {
        let store = Arc::new(MemoryNoteStore::new());
        let adapter = LocalAdapter::new(Arc::clone(&store), &config());

        let id = adapter.create("owner", "t", "b").unwrap();
        assert!(adapter.update(&id, "t", "b2"));
        assert_eq!(adapter.list_all().unwrap().len(), 1);
        assert!(adapter.delete(&id));
        assert!(adapter.delete(&id));
        assert!(!adapter.update(&id, "t", "b3"));

        store.fail(StoreOperation::ListNotes, Fault::Fatal);
        assert!(adapter.list_all().is_err());
    }
}
