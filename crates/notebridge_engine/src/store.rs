//! Collaborator contracts for the two note stores.
//!
//! The engine knows nothing about transport, authentication or storage
//! formats of either side. Embedders implement [`DocumentStore`] over the
//! remote document service and [`NoteStore`] over the local note database.
//! Implementations report failures through [`SyncError`]: transient
//! failures as retryable transport errors or timeouts, missing records as
//! [`SyncError::NotFound`].
//!
//! [`SyncError`]: crate::SyncError
//! [`SyncError::NotFound`]: crate::SyncError::NotFound

use crate::error::SyncResult;
use notebridge_model::{LocalNote, RemoteNote};

/// A document as the remote store reports it, without its body.
pub type DocumentRecord = RemoteNote;

/// One page of a document listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentPage {
    /// Documents on this page.
    pub documents: Vec<DocumentRecord>,
    /// Cursor for the next page, absent on the last page.
    pub next_cursor: Option<String>,
}

impl DocumentPage {
    /// Creates a page.
    pub fn new(documents: Vec<DocumentRecord>, next_cursor: Option<String>) -> Self {
        Self {
            documents,
            next_cursor,
        }
    }

    /// Returns true if more pages follow.
    pub fn has_more(&self) -> bool {
        self.next_cursor.is_some()
    }
}

/// The remote structured-document store.
pub trait DocumentStore: Send + Sync + 'static {
    /// Lists one page of live (non-archived) documents.
    fn list_documents(&self, cursor: Option<&str>, page_size: usize) -> SyncResult<DocumentPage>;

    /// Returns a document's body, or an empty string when it has none.
    fn get_document_content(&self, id: &str) -> SyncResult<String>;

    /// Creates a document and returns it as stored.
    fn create_document(
        &self,
        title: &str,
        body: &str,
        category: Option<&str>,
    ) -> SyncResult<DocumentRecord>;

    /// Replaces a document's title, body and category and returns it as stored.
    fn update_document(
        &self,
        id: &str,
        title: &str,
        body: &str,
        category: Option<&str>,
    ) -> SyncResult<DocumentRecord>;

    /// Archives a document so it no longer appears in listings.
    fn archive_document(&self, id: &str) -> SyncResult<()>;
}

/// The local note store.
pub trait NoteStore: Send + Sync + 'static {
    /// Lists every note.
    fn list_notes(&self) -> SyncResult<Vec<LocalNote>>;

    /// Creates a note and returns its id.
    fn create_note(&self, owner_id: &str, title: &str, body: &str) -> SyncResult<String>;

    /// Replaces a note's title and body.
    fn update_note(&self, id: &str, title: &str, body: &str) -> SyncResult<()>;

    /// Deletes a note.
    fn delete_note(&self, id: &str) -> SyncResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_has_more() {
        assert!(!DocumentPage::default().has_more());
        assert!(DocumentPage::new(Vec::new(), Some("c1".into())).has_more());
    }
}
