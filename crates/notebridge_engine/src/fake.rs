//! In-memory collaborators for tests and local experiments.
//!
//! Both stores count calls per operation and accept injected faults so
//! tests can exercise retry, timeout and partial-failure paths without a
//! network. They share a [`TestClock`] when built with one, which makes
//! modification times across the two stores comparable.

use crate::error::{SyncError, SyncResult};
use crate::store::{DocumentPage, DocumentRecord, DocumentStore, NoteStore};
use chrono::DateTime;
use notebridge_model::{compose_title, LocalNote, RemoteNote, Timestamp};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 2024-01-01T00:00:00Z
const CLOCK_START: i64 = 1_704_067_200;

/// A logical clock that advances one second per write.
#[derive(Debug)]
pub struct TestClock {
    seconds: AtomicI64,
}

impl TestClock {
    /// Creates a clock at its default start.
    pub fn new() -> Self {
        Self {
            seconds: AtomicI64::new(CLOCK_START),
        }
    }

    /// Advances and returns the new time in epoch seconds.
    pub fn tick(&self) -> i64 {
        self.seconds.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Moves the clock forward.
    pub fn advance(&self, seconds: i64) {
        self.seconds.fetch_add(seconds, Ordering::SeqCst);
    }

    /// Current time in epoch seconds.
    pub fn now(&self) -> i64 {
        self.seconds.load(Ordering::SeqCst)
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Operations the fakes count and can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreOperation {
    /// [`DocumentStore::list_documents`]
    ListDocuments,
    /// [`DocumentStore::get_document_content`]
    GetContent,
    /// [`DocumentStore::create_document`]
    CreateDocument,
    /// [`DocumentStore::update_document`]
    UpdateDocument,
    /// [`DocumentStore::archive_document`]
    ArchiveDocument,
    /// [`NoteStore::list_notes`]
    ListNotes,
    /// [`NoteStore::create_note`]
    CreateNote,
    /// [`NoteStore::update_note`]
    UpdateNote,
    /// [`NoteStore::delete_note`]
    DeleteNote,
}

/// A failure to inject into a fake store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fails with a retryable transport error.
    Transient,
    /// Fails with a non-retryable transport error.
    Fatal,
    /// Fails with [`SyncError::NotFound`].
    NotFound,
    /// Sleeps before serving the call normally.
    Delay(Duration),
}

#[derive(Debug)]
struct FaultRule {
    operation: StoreOperation,
    id: Option<String>,
    fault: Fault,
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct FaultPlan {
    rules: Mutex<Vec<FaultRule>>,
    calls: Mutex<BTreeMap<StoreOperation, usize>>,
}

impl FaultPlan {
    fn inject(&self, operation: StoreOperation, id: Option<String>, fault: Fault, times: Option<u32>) {
        if times == Some(0) {
            return;
        }
        self.rules.lock().push(FaultRule {
            operation,
            id,
            fault,
            remaining: times,
        });
    }

    fn clear(&self) {
        self.rules.lock().clear();
    }

    fn calls(&self, operation: StoreOperation) -> usize {
        self.calls.lock().get(&operation).copied().unwrap_or(0)
    }

    /// Counts the call and applies the first matching fault, if any.
    fn enter(&self, operation: StoreOperation, id: &str) -> SyncResult<()> {
        *self.calls.lock().entry(operation).or_default() += 1;

        let fault = {
            let mut rules = self.rules.lock();
            let position = rules.iter().position(|rule| {
                rule.operation == operation && rule.id.as_deref().map_or(true, |rid| rid == id)
            });
            position.map(|index| {
                let fault = rules[index].fault;
                if let Some(remaining) = rules[index].remaining.as_mut() {
                    *remaining -= 1;
                    if *remaining == 0 {
                        rules.remove(index);
                    }
                }
                fault
            })
        };

        match fault {
            None => Ok(()),
            Some(Fault::Transient) => Err(SyncError::transport_retryable(format!(
                "injected transient failure in {operation:?}"
            ))),
            Some(Fault::Fatal) => Err(SyncError::transport_fatal(format!(
                "injected failure in {operation:?}"
            ))),
            Some(Fault::NotFound) => Err(SyncError::not_found(id)),
            Some(Fault::Delay(delay)) => {
                std::thread::sleep(delay);
                Ok(())
            }
        }
    }
}

/// A document held by [`MemoryDocumentStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    /// Title as stored.
    pub title: String,
    /// Category as stored.
    pub category: Option<String>,
    /// Body content.
    pub body: String,
    /// Last modification time.
    pub last_modified: Timestamp,
    /// Archived documents are hidden from listings.
    pub archived: bool,
}

/// An in-memory [`DocumentStore`] reporting RFC3339 timestamps.
#[derive(Debug)]
pub struct MemoryDocumentStore {
    documents: RwLock<BTreeMap<String, StoredDocument>>,
    next_id: AtomicU64,
    clock: Arc<TestClock>,
    faults: FaultPlan,
    fold_titles: AtomicBool,
    stuck_cursor: AtomicBool,
}

impl MemoryDocumentStore {
    /// Creates an empty store with its own clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(TestClock::new()))
    }

    /// Creates an empty store on a shared clock.
    pub fn with_clock(clock: Arc<TestClock>) -> Self {
        Self {
            documents: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            clock,
            faults: FaultPlan::default(),
            fold_titles: AtomicBool::new(false),
            stuck_cursor: AtomicBool::new(false),
        }
    }

    fn timestamp(&self) -> Timestamp {
        let seconds = self.clock.tick();
        DateTime::from_timestamp(seconds, 0)
            .map(Timestamp::from_instant)
            .unwrap_or_else(|| Timestamp::from(seconds))
    }

    fn record(id: &str, doc: &StoredDocument) -> DocumentRecord {
        RemoteNote::new(id, doc.title.clone(), doc.category.clone(), doc.last_modified.clone())
    }

    fn stored(&self, title: &str, category: Option<&str>, body: &str) -> StoredDocument {
        let (title, category) = if self.fold_titles.load(Ordering::SeqCst) {
            (compose_title(category, title), None)
        } else {
            (title.to_string(), category.map(str::to_string))
        };
        StoredDocument {
            title,
            category,
            body: body.to_string(),
            last_modified: self.timestamp(),
            archived: false,
        }
    }

    /// Adds a document directly, bypassing fault injection and counters.
    pub fn insert_document(&self, title: &str, category: Option<&str>, body: &str) -> String {
        let id = format!("page-{:04}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let doc = self.stored(title, category, body);
        self.documents.write().insert(id.clone(), doc);
        id
    }

    /// Edits a document as a user of the remote store would.
    pub fn edit_document(&self, id: &str, title: &str, body: &str) {
        let ts = self.timestamp();
        if let Some(doc) = self.documents.write().get_mut(id) {
            doc.title = title.to_string();
            doc.body = body.to_string();
            doc.last_modified = ts;
        }
    }

    /// Bumps the modification time without changing content.
    pub fn touch_document(&self, id: &str) {
        let ts = self.timestamp();
        if let Some(doc) = self.documents.write().get_mut(id) {
            doc.last_modified = ts;
        }
    }

    /// Overrides the modification time.
    pub fn set_last_modified(&self, id: &str, ts: impl Into<Timestamp>) {
        if let Some(doc) = self.documents.write().get_mut(id) {
            doc.last_modified = ts.into();
        }
    }

    /// Hard-deletes a document.
    pub fn remove_document(&self, id: &str) -> Option<StoredDocument> {
        self.documents.write().remove(id)
    }

    /// Returns a document, archived or not.
    pub fn document(&self, id: &str) -> Option<StoredDocument> {
        self.documents.read().get(id).cloned()
    }

    /// Live documents in id order.
    pub fn live_documents(&self) -> Vec<(String, StoredDocument)> {
        self.documents
            .read()
            .iter()
            .filter(|(_, doc)| !doc.archived)
            .map(|(id, doc)| (id.clone(), doc.clone()))
            .collect()
    }

    /// Number of live documents.
    pub fn live_count(&self) -> usize {
        self.documents.read().values().filter(|doc| !doc.archived).count()
    }

    /// Stores categories folded into titles, like a store without a category property.
    pub fn set_fold_titles(&self, fold: bool) {
        self.fold_titles.store(fold, Ordering::SeqCst);
    }

    /// Makes listings return the same cursor forever.
    pub fn set_stuck_cursor(&self, stuck: bool) {
        self.stuck_cursor.store(stuck, Ordering::SeqCst);
    }

    /// Fails every call of an operation.
    pub fn fail(&self, operation: StoreOperation, fault: Fault) {
        self.faults.inject(operation, None, fault, None);
    }

    /// Fails the next `times` calls of an operation.
    pub fn fail_times(&self, operation: StoreOperation, fault: Fault, times: u32) {
        self.faults.inject(operation, None, fault, Some(times));
    }

    /// Fails every call of an operation on one document.
    pub fn fail_id(&self, operation: StoreOperation, id: &str, fault: Fault) {
        self.faults.inject(operation, Some(id.to_string()), fault, None);
    }

    /// Removes all injected faults.
    pub fn clear_faults(&self) {
        self.faults.clear();
    }

    /// Calls made to an operation.
    pub fn calls(&self, operation: StoreOperation) -> usize {
        self.faults.calls(operation)
    }

    /// Create, update and archive calls made.
    pub fn write_calls(&self) -> usize {
        self.calls(StoreOperation::CreateDocument)
            + self.calls(StoreOperation::UpdateDocument)
            + self.calls(StoreOperation::ArchiveDocument)
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn list_documents(&self, cursor: Option<&str>, page_size: usize) -> SyncResult<DocumentPage> {
        self.faults
            .enter(StoreOperation::ListDocuments, cursor.unwrap_or_default())?;

        let offset = match cursor {
            None => 0,
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| SyncError::Protocol(format!("unknown cursor {cursor}")))?,
        };
        let page_size = page_size.max(1);

        let documents = self.documents.read();
        let live: Vec<_> = documents.iter().filter(|(_, doc)| !doc.archived).collect();
        let page = live
            .iter()
            .skip(offset)
            .take(page_size)
            .map(|(id, doc)| Self::record(id, doc))
            .collect();

        let next = offset + page_size;
        let next_cursor = if next >= live.len() {
            None
        } else if self.stuck_cursor.load(Ordering::SeqCst) {
            Some(offset.to_string())
        } else {
            Some(next.to_string())
        };

        Ok(DocumentPage::new(page, next_cursor))
    }

    fn get_document_content(&self, id: &str) -> SyncResult<String> {
        self.faults.enter(StoreOperation::GetContent, id)?;
        self.documents
            .read()
            .get(id)
            .filter(|doc| !doc.archived)
            .map(|doc| doc.body.clone())
            .ok_or_else(|| SyncError::not_found(id))
    }

    fn create_document(
        &self,
        title: &str,
        body: &str,
        category: Option<&str>,
    ) -> SyncResult<DocumentRecord> {
        self.faults.enter(StoreOperation::CreateDocument, title)?;
        let id = self.insert_document(title, category, body);
        self.documents
            .read()
            .get(&id)
            .map(|doc| Self::record(&id, doc))
            .ok_or_else(|| SyncError::not_found(id.clone()))
    }

    fn update_document(
        &self,
        id: &str,
        title: &str,
        body: &str,
        category: Option<&str>,
    ) -> SyncResult<DocumentRecord> {
        self.faults.enter(StoreOperation::UpdateDocument, id)?;
        let replacement = self.stored(title, category, body);
        let mut documents = self.documents.write();
        match documents.get_mut(id) {
            Some(doc) if !doc.archived => {
                *doc = replacement;
                Ok(Self::record(id, doc))
            }
            _ => Err(SyncError::not_found(id)),
        }
    }

    fn archive_document(&self, id: &str) -> SyncResult<()> {
        self.faults.enter(StoreOperation::ArchiveDocument, id)?;
        let ts = self.timestamp();
        let mut documents = self.documents.write();
        match documents.get_mut(id) {
            Some(doc) if !doc.archived => {
                doc.archived = true;
                doc.last_modified = ts;
                Ok(())
            }
            _ => Err(SyncError::not_found(id)),
        }
    }
}

/// A note held by [`MemoryNoteStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNote {
    /// Owner the note was created for.
    pub owner_id: String,
    /// Title, possibly category-prefixed.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Last modification time as epoch nanoseconds.
    pub last_modified: Timestamp,
}

/// An in-memory [`NoteStore`] reporting epoch-nanosecond timestamps.
#[derive(Debug)]
pub struct MemoryNoteStore {
    notes: RwLock<BTreeMap<String, StoredNote>>,
    clock: Arc<TestClock>,
    faults: FaultPlan,
    report_timestamps: AtomicBool,
}

impl MemoryNoteStore {
    /// Creates an empty store with its own clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(TestClock::new()))
    }

    /// Creates an empty store on a shared clock.
    pub fn with_clock(clock: Arc<TestClock>) -> Self {
        Self {
            notes: RwLock::new(BTreeMap::new()),
            clock,
            faults: FaultPlan::default(),
            report_timestamps: AtomicBool::new(true),
        }
    }

    fn timestamp(&self) -> Timestamp {
        Timestamp::from(self.clock.tick().saturating_mul(1_000_000_000))
    }

    /// Adds a note directly, bypassing fault injection and counters.
    pub fn insert_note(&self, title: &str, body: &str) -> String {
        self.insert_owned("", title, body)
    }

    fn insert_owned(&self, owner_id: &str, title: &str, body: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let note = StoredNote {
            owner_id: owner_id.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            last_modified: self.timestamp(),
        };
        self.notes.write().insert(id.clone(), note);
        id
    }

    /// Edits a note as a user of the local store would.
    pub fn edit_note(&self, id: &str, title: &str, body: &str) {
        let ts = self.timestamp();
        if let Some(note) = self.notes.write().get_mut(id) {
            note.title = title.to_string();
            note.body = body.to_string();
            note.last_modified = ts;
        }
    }

    /// Overrides the modification time.
    pub fn set_last_modified(&self, id: &str, ts: impl Into<Timestamp>) {
        if let Some(note) = self.notes.write().get_mut(id) {
            note.last_modified = ts.into();
        }
    }

    /// Deletes a note directly.
    pub fn remove_note(&self, id: &str) -> Option<StoredNote> {
        self.notes.write().remove(id)
    }

    /// Returns a note.
    pub fn note(&self, id: &str) -> Option<StoredNote> {
        self.notes.read().get(id).cloned()
    }

    /// Finds the id of the first note with a title.
    pub fn find_by_title(&self, title: &str) -> Option<String> {
        self.notes
            .read()
            .iter()
            .find(|(_, note)| note.title == title)
            .map(|(id, _)| id.clone())
    }

    /// All notes in id order.
    pub fn notes(&self) -> Vec<(String, StoredNote)> {
        self.notes
            .read()
            .iter()
            .map(|(id, note)| (id.clone(), note.clone()))
            .collect()
    }

    /// Number of notes.
    pub fn len(&self) -> usize {
        self.notes.read().len()
    }

    /// Returns true if the store holds no notes.
    pub fn is_empty(&self) -> bool {
        self.notes.read().is_empty()
    }

    /// Controls whether listings carry modification times.
    pub fn set_report_timestamps(&self, report: bool) {
        self.report_timestamps.store(report, Ordering::SeqCst);
    }

    /// Fails every call of an operation.
    pub fn fail(&self, operation: StoreOperation, fault: Fault) {
        self.faults.inject(operation, None, fault, None);
    }

    /// Fails the next `times` calls of an operation.
    pub fn fail_times(&self, operation: StoreOperation, fault: Fault, times: u32) {
        self.faults.inject(operation, None, fault, Some(times));
    }

    /// Fails every call of an operation on one note.
    pub fn fail_id(&self, operation: StoreOperation, id: &str, fault: Fault) {
        self.faults.inject(operation, Some(id.to_string()), fault, None);
    }

    /// Removes all injected faults.
    pub fn clear_faults(&self) {
        self.faults.clear();
    }

    /// Calls made to an operation.
    pub fn calls(&self, operation: StoreOperation) -> usize {
        self.faults.calls(operation)
    }

    /// Create, update and delete calls made.
    pub fn write_calls(&self) -> usize {
        self.calls(StoreOperation::CreateNote)
            + self.calls(StoreOperation::UpdateNote)
            + self.calls(StoreOperation::DeleteNote)
    }
}

impl Default for MemoryNoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteStore for MemoryNoteStore {
    fn list_notes(&self) -> SyncResult<Vec<LocalNote>> {
        self.faults.enter(StoreOperation::ListNotes, "")?;
        let report = self.report_timestamps.load(Ordering::SeqCst);
        Ok(self
            .notes
            .read()
            .iter()
            .map(|(id, note)| LocalNote {
                id: id.clone(),
                title: note.title.clone(),
                body: note.body.clone(),
                last_modified: report.then(|| note.last_modified.clone()),
            })
            .collect())
    }

    fn create_note(&self, owner_id: &str, title: &str, body: &str) -> SyncResult<String> {
        self.faults.enter(StoreOperation::CreateNote, title)?;
        Ok(self.insert_owned(owner_id, title, body))
    }

    fn update_note(&self, id: &str, title: &str, body: &str) -> SyncResult<()> {
        self.faults.enter(StoreOperation::UpdateNote, id)?;
        let ts = self.timestamp();
        let mut notes = self.notes.write();
        let note = notes.get_mut(id).ok_or_else(|| SyncError::not_found(id))?;
        note.title = title.to_string();
        note.body = body.to_string();
        note.last_modified = ts;
        Ok(())
    }

    fn delete_note(&self, id: &str) -> SyncResult<()> {
        self.faults.enter(StoreOperation::DeleteNote, id)?;
        self.notes
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SyncError::not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lifecycle() {
        let store = MemoryDocumentStore::new();
        let record = store.create_document("Plan", "v1", Some("Work")).unwrap();
        assert_eq!(record.category.as_deref(), Some("Work"));
        assert!(record.last_modified.instant().is_some());

        assert_eq!(store.get_document_content(&record.id).unwrap(), "v1");

        let updated = store.update_document(&record.id, "Plan", "v2", None).unwrap();
        assert_ne!(updated.last_modified, record.last_modified);

        store.archive_document(&record.id).unwrap();
        assert_eq!(store.live_count(), 0);
        assert!(store.get_document_content(&record.id).unwrap_err().is_not_found());
        assert!(store.archive_document(&record.id).unwrap_err().is_not_found());
        assert_eq!(store.write_calls(), 4);
    }

    #[test]
    fn pagination() {
        let store = MemoryDocumentStore::new();
        for i in 0..5 {
            store.insert_document(&format!("d{i}"), None, "b");
        }
        let first = store.list_documents(None, 2).unwrap();
        assert_eq!(first.documents.len(), 2);
        assert_eq!(first.next_cursor.as_deref(), Some("2"));
        let last = store.list_documents(Some("4"), 2).unwrap();
        assert_eq!(last.documents.len(), 1);
        assert!(!last.has_more());
    }

    #[test]
    fn folded_titles() {
        let store = MemoryDocumentStore::new();
        store.set_fold_titles(true);
        let record = store.create_document("Plan", "b", Some("Work")).unwrap();
        assert_eq!(record.title, "[Work] Plan");
        assert!(record.category.is_none());
    }

    #[test]
    fn faults_are_counted_and_expire() {
        let store = MemoryDocumentStore::new();
        store.fail_times(StoreOperation::ListDocuments, Fault::Transient, 1);
        assert!(store.list_documents(None, 10).unwrap_err().is_retryable());
        assert!(store.list_documents(None, 10).is_ok());
        assert_eq!(store.calls(StoreOperation::ListDocuments), 2);
    }

    #[test]
    fn id_scoped_faults() {
        let store = MemoryDocumentStore::new();
        let a = store.insert_document("a", None, "x");
        let b = store.insert_document("b", None, "y");
        store.fail_id(StoreOperation::GetContent, &a, Fault::Fatal);
        assert!(store.get_document_content(&a).is_err());
        assert_eq!(store.get_document_content(&b).unwrap(), "y");
        store.clear_faults();
        assert!(store.get_document_content(&a).is_ok());
    }

    #[test]
    fn note_lifecycle() {
        let store = MemoryNoteStore::new();
        let id = store.create_note("owner", "t", "b").unwrap();
        assert_eq!(store.note(&id).unwrap().owner_id, "owner");
        store.update_note(&id, "t2", "b2").unwrap();
        assert_eq!(store.find_by_title("t2"), Some(id.clone()));
        store.delete_note(&id).unwrap();
        assert!(store.delete_note(&id).unwrap_err().is_not_found());
        assert!(store.is_empty());
    }

    #[test]
    fn note_timestamps_are_nanoseconds() {
        let store = MemoryNoteStore::new();
        store.insert_note("t", "b");
        let notes = store.list_notes().unwrap();
        let ts = notes[0].last_modified.clone().unwrap();
        assert!(ts.as_str().len() >= 19);
        assert!(ts.instant().is_some());

        store.set_report_timestamps(false);
        assert!(store.list_notes().unwrap()[0].last_modified.is_none());
    }

    #[test]
    fn shared_clock_orders_both_stores() {
        let clock = Arc::new(TestClock::new());
        let docs = MemoryDocumentStore::with_clock(Arc::clone(&clock));
        let notes = MemoryNoteStore::with_clock(Arc::clone(&clock));
        let doc = docs.create_document("d", "b", None).unwrap();
        notes.insert_note("n", "b");
        let note = &notes.list_notes().unwrap()[0];
        let note_ts = note.last_modified.as_ref().and_then(Timestamp::instant).unwrap();
        assert!(note_ts > doc.last_modified.instant().unwrap());
    }
}
