//! Property-based test generators using proptest.
//!
//! Provides strategies for note sets and edit sequences that keep to the
//! title convention, so a converged pair always compares equal.

use crate::fixtures::SyncHarness;
use notebridge_model::compose_title;
use proptest::prelude::*;

/// A note to seed on one side.
#[derive(Debug, Clone)]
pub struct NoteSeed {
    /// Optional category.
    pub category: Option<String>,
    /// Title without category.
    pub title: String,
    /// Non-blank body.
    pub body: String,
}

impl NoteSeed {
    /// The title as the local store holds it.
    pub fn folded_title(&self) -> String {
        compose_title(self.category.as_deref(), &self.title)
    }
}

/// One change made by a user between passes.
///
/// Indexes pick a note modulo the current count on that side; an edit
/// against an empty side does nothing.
#[derive(Debug, Clone)]
pub enum Edit {
    /// Adds a local note.
    AddLocal(NoteSeed),
    /// Adds a remote document.
    AddRemote(NoteSeed),
    /// Rewrites a local note's body.
    EditLocal(usize, String),
    /// Rewrites a remote document's body.
    EditRemote(usize, String),
    /// Deletes a local note.
    DeleteLocal(usize),
    /// Deletes a remote document.
    DeleteRemote(usize),
    /// Bumps a remote document's modification time only.
    TouchRemote(usize),
}

/// Strategy for valid categories.
pub fn category_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::string::string_regex("[A-Za-z][A-Za-z0-9]{0,8}").expect("Invalid regex"))
}

/// Strategy for titles that never look like a category prefix.
pub fn title_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9 ]{0,15}").expect("Invalid regex")
}

/// Strategy for non-blank bodies.
pub fn body_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z \n]{0,40}").expect("Invalid regex")
}

/// Strategy for a single note.
pub fn note_seed_strategy() -> impl Strategy<Value = NoteSeed> {
    (category_strategy(), title_strategy(), body_strategy()).prop_map(
        |(category, title, body)| NoteSeed {
            category,
            title,
            body,
        },
    )
}

/// Strategy for notes on both sides.
pub fn note_sets_strategy(
    max: usize,
) -> impl Strategy<Value = (Vec<NoteSeed>, Vec<NoteSeed>)> {
    (
        prop::collection::vec(note_seed_strategy(), 0..=max),
        prop::collection::vec(note_seed_strategy(), 0..=max),
    )
}

/// Strategy for a single edit.
pub fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        note_seed_strategy().prop_map(Edit::AddLocal),
        note_seed_strategy().prop_map(Edit::AddRemote),
        (any::<usize>(), body_strategy()).prop_map(|(i, b)| Edit::EditLocal(i, b)),
        (any::<usize>(), body_strategy()).prop_map(|(i, b)| Edit::EditRemote(i, b)),
        any::<usize>().prop_map(Edit::DeleteLocal),
        any::<usize>().prop_map(Edit::DeleteRemote),
        any::<usize>().prop_map(Edit::TouchRemote),
    ]
}

/// Strategy for a sequence of edits.
pub fn edits_strategy(max: usize) -> impl Strategy<Value = Vec<Edit>> {
    prop::collection::vec(edit_strategy(), 0..=max)
}

/// Seeds both stores.
pub fn seed(harness: &SyncHarness, local: &[NoteSeed], remote: &[NoteSeed]) {
    for note in local {
        harness.notes.insert_note(&note.folded_title(), &note.body);
    }
    for note in remote {
        harness
            .docs
            .insert_document(&note.title, note.category.as_deref(), &note.body);
    }
}

/// Applies one edit to the harness stores.
pub fn apply_edit(harness: &SyncHarness, edit: &Edit) {
    match edit {
        Edit::AddLocal(note) => {
            harness.notes.insert_note(&note.folded_title(), &note.body);
        }
        Edit::AddRemote(note) => {
            harness
                .docs
                .insert_document(&note.title, note.category.as_deref(), &note.body);
        }
        Edit::EditLocal(index, body) => {
            if let Some((id, note)) = pick(harness.notes.notes(), *index) {
                harness.notes.edit_note(&id, &note.title, body);
            }
        }
        Edit::EditRemote(index, body) => {
            if let Some((id, doc)) = pick(harness.docs.live_documents(), *index) {
                harness.docs.edit_document(&id, &doc.title, body);
            }
        }
        Edit::DeleteLocal(index) => {
            if let Some((id, _)) = pick(harness.notes.notes(), *index) {
                harness.notes.remove_note(&id);
            }
        }
        Edit::DeleteRemote(index) => {
            if let Some((id, _)) = pick(harness.docs.live_documents(), *index) {
                harness.docs.remove_document(&id);
            }
        }
        Edit::TouchRemote(index) => {
            if let Some((id, _)) = pick(harness.docs.live_documents(), *index) {
                harness.docs.touch_document(&id);
            }
        }
    }
}

fn pick<T>(mut items: Vec<T>, index: usize) -> Option<T> {
    if items.is_empty() {
        return None;
    }
    let len = items.len();
    Some(items.swap_remove(index % len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notebridge_model::decompose_title;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn generated_titles_round_trip() {
        let mut runner = TestRunner::default();
        for _ in 0..100 {
            let seed = note_seed_strategy()
                .new_tree(&mut runner)
                .unwrap()
                .current();
            let (category, title) = decompose_title(&seed.folded_title());
            assert_eq!(category, seed.category);
            assert_eq!(title, seed.title);
            assert!(!seed.body.trim().is_empty());
        }
    }

    #[test]
    fn edits_on_empty_stores_are_noops() {
        let h = SyncHarness::new();
        for edit in [
            Edit::EditLocal(3, "x".into()),
            Edit::DeleteRemote(1),
            Edit::TouchRemote(0),
        ] {
            apply_edit(&h, &edit);
        }
        assert!(h.notes.is_empty());
        assert_eq!(h.docs.live_count(), 0);
    }
}
