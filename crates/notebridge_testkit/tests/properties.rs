//! Property tests for reconciliation passes over generated note sets.

use notebridge_model::duplicate_remote_ids;
use notebridge_testkit::prelude::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn second_pass_changes_nothing((local, remote) in note_sets_strategy(6)) {
        let h = SyncHarness::new();
        seed(&h, &local, &remote);

        let first = h.pass();
        prop_assert_eq!(first.counts.created_remote as usize + first.counts.linked as usize, local.len());

        let doc_writes = h.docs.write_calls();
        let note_writes = h.notes.write_calls();
        let second = h.pass();
        prop_assert_eq!(second.counts.changes(), 0);
        prop_assert_eq!(second.counts.conflicts, 0);
        prop_assert_eq!(h.docs.write_calls(), doc_writes);
        prop_assert_eq!(h.notes.write_calls(), note_writes);
        h.assert_converged();
    }

    #[test]
    fn edits_converge_after_one_pass(
        (local, remote) in note_sets_strategy(5),
        rounds in prop::collection::vec(edits_strategy(6), 1..4),
    ) {
        let h = SyncHarness::new();
        seed(&h, &local, &remote);
        h.pass();

        for edits in &rounds {
            for edit in edits {
                apply_edit(&h, edit);
            }
            h.pass();
            h.assert_converged();
            prop_assert_eq!(h.pass().counts.changes(), 0);
        }
    }

    #[test]
    fn saved_state_has_unique_remote_ids(
        (local, remote) in note_sets_strategy(6),
        edits in edits_strategy(8),
    ) {
        let h = SyncHarness::new();
        seed(&h, &local, &remote);
        h.pass();
        for edit in &edits {
            apply_edit(&h, edit);
        }
        h.pass();

        let state = h.stored_state();
        let entries = state.keyed_entries();
        prop_assert!(duplicate_remote_ids(entries.iter()).is_empty());
        prop_assert_eq!(state.remote_index.len(), state.entries.len());
    }

    #[test]
    fn state_loss_never_duplicates((local, remote) in note_sets_strategy(6)) {
        let mut h = SyncHarness::new();
        seed(&h, &local, &remote);
        h.pass();
        let notes = h.notes.len();
        let docs = h.docs.live_count();

        h.lose_state();
        let summary = h.pass();
        prop_assert_eq!(summary.counts.created(), 0);
        prop_assert_eq!(h.notes.len(), notes);
        prop_assert_eq!(h.docs.live_count(), docs);
        h.assert_converged();
    }
}
