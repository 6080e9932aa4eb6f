//! Snapshots of notes in the two stores.

use crate::fingerprint::Fingerprint;
use crate::timestamp::Timestamp;
use crate::title::{compose_title, decompose_title};
use serde::{Deserialize, Serialize};

/// Returns true if a body counts as content worth syncing.
///
/// Whitespace-only bodies are treated as empty.
pub fn has_content(body: &str) -> bool {
    !body.trim().is_empty()
}

/// A note as listed by the remote document store.
///
/// Listings carry metadata only; body content is fetched separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNote {
    /// Opaque remote id.
    pub id: String,
    /// Plain title, without any category prefix.
    pub title: String,
    /// Optional category label.
    pub category: Option<String>,
    /// Last modification time as reported by the store.
    pub last_modified: Timestamp,
}

impl RemoteNote {
    /// Creates a remote note snapshot.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        category: Option<String>,
        last_modified: impl Into<Timestamp>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            category,
            last_modified: last_modified.into(),
        }
    }

    /// The title as it appears on the local side.
    pub fn folded_title(&self) -> String {
        compose_title(self.category.as_deref(), &self.title)
    }

    /// Fingerprint of this note combined with fetched body content.
    pub fn fingerprint(&self, body: &str) -> Fingerprint {
        Fingerprint::of(&self.folded_title(), body)
    }
}

/// A note as listed by the local note store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalNote {
    /// Opaque local id.
    pub id: String,
    /// Title, possibly carrying a `"[Category] "` prefix.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Last modification time, when the store reports one.
    pub last_modified: Option<Timestamp>,
}

impl LocalNote {
    /// Creates a local note snapshot.
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            last_modified: None,
        }
    }

    /// Sets the modification time.
    #[must_use]
    pub fn with_last_modified(mut self, ts: impl Into<Timestamp>) -> Self {
        self.last_modified = Some(ts.into());
        self
    }

    /// Content fingerprint over the folded title and body.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.title, &self.body)
    }

    /// Splits the title into category and plain title for the remote side.
    pub fn split_title(&self) -> (Option<String>, String) {
        decompose_title(&self.title)
    }

    /// Returns true if the body is non-blank.
    pub fn has_content(&self) -> bool {
        has_content(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_and_local_fingerprints_agree() {
        let remote = RemoteNote::new("r1", "Plan", Some("Work".into()), "2024-01-01T10:00:00Z");
        let local = LocalNote::new("l1", "[Work] Plan", "body");
        assert_eq!(remote.fingerprint("body"), local.fingerprint());
    }

    #[test]
    fn split_title() {
        let local = LocalNote::new("l1", "[Work] Plan", "body");
        assert_eq!(local.split_title(), (Some("Work".into()), "Plan".into()));
    }

    #[test]
    fn blank_bodies_have_no_content() {
        assert!(!has_content(""));
        assert!(!has_content(" \n\t"));
        assert!(has_content(" x "));
        assert!(!LocalNote::new("l1", "t", "   ").has_content());
    }
}
