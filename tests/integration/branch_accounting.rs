//! Branch creation, ahead/behind accounting and append preconditions

use super::test_utils::{ahead_behind, memory_session, memory_store, run, stream_names};
use branchlog::{Payload, StoreError};
use std::collections::BTreeMap;

#[test]
fn test_branch_from_empty_root() {
    let mut s = memory_session("A");
    run(&mut s, &["branch a", "checkout a", "name a1", "name a2"]);

    let b = s.store().current();
    assert_eq!(b.name, "a");
    assert_eq!(b.command_count, 3);
    // CreateBranch is the one command the parent never needs.
    assert_eq!(b.command_discount, 1);
    // The child knows about the parent's CreateStore only.
    assert_eq!(b.refresh_count, 1);
    assert_eq!(b.refresh_discount, 0);
}

#[test]
fn test_ahead_and_behind_track_both_sides() {
    let mut s = memory_session("A");
    run(&mut s, &["name A1", "mkdir B", "name A2", "cd B", "name B1", "name B2"]);
    assert_eq!(ahead_behind(&s), (2, 1));

    run(&mut s, &["merge .."]);
    assert_eq!(ahead_behind(&s), (2, 0));

    run(&mut s, &["cd ..", "merge B", "cd B"]);
    assert_eq!(ahead_behind(&s), (0, 0));
    assert_eq!(stream_names(&s), vec!["A1", "B1", "B2", "A2"]);
}

#[test]
fn test_branch_with_explicit_count() {
    let mut s = memory_session("A");
    run(&mut s, &["name A1", "name A2", "mkdir B 2", "cd B"]);

    assert_eq!(s.store().current().refresh_count, 2);
    assert_eq!(ahead_behind(&s), (0, 1));
    assert_eq!(stream_names(&s), vec!["A1"]);

    run(&mut s, &["merge .."]);
    assert_eq!(stream_names(&s), vec!["A1", "A2"]);
}

#[test]
fn test_invalid_command_counts_are_rejected() {
    let mut s = memory_session("A");
    for line in ["mkdir B 0", "mkdir B 5"] {
        let err = s.execute(line).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidCommandCount { available: 1, .. }
        ));
    }
    assert_eq!(s.store().branches().len(), 1);
}

#[test]
fn test_branch_names_are_unique_ignoring_case() {
    let mut s = memory_session("A");
    run(&mut s, &["mkdir B"]);
    assert!(matches!(
        s.execute("mkdir b").unwrap_err(),
        StoreError::DuplicateBranchName(_)
    ));

    // Lookups are case-insensitive as well.
    run(&mut s, &["cd b"]);
    assert_eq!(s.store().current().name, "B");
}

#[test]
fn test_reserved_branch_names() {
    let mut s = memory_session("A");
    for line in ["mkdir ..", "mkdir +mine", "mkdir ."] {
        assert!(
            matches!(s.execute(line).unwrap_err(), StoreError::InvalidBranchName(_)),
            "{} should be rejected",
            line
        );
    }
}

#[test]
fn test_merge_requires_adjacent_branches() {
    let mut s = memory_session("A");
    run(&mut s, &["mkdir B", "mkdir C", "cd C", "name C1", "cd ../B"]);
    assert!(matches!(
        s.execute("merge ../C").unwrap_err(),
        StoreError::NotAdjacent { .. }
    ));
    assert!(matches!(
        s.execute("merge /nowhere").unwrap_err(),
        StoreError::BranchNotFound(_)
    ));
}

#[test]
fn test_merge_with_nothing_new() {
    let mut s = memory_session("A");
    run(&mut s, &["mkdir B", "cd B"]);
    assert!(matches!(
        s.execute("merge ..").unwrap_err(),
        StoreError::NothingToMerge(_)
    ));

    run(&mut s, &["name B1", "cd ..", "merge B"]);
    assert!(matches!(
        s.execute("merge B").unwrap_err(),
        StoreError::NothingToMerge(_)
    ));
}

#[test]
fn test_complete_requires_parent_to_be_current() {
    let mut s = memory_session("A");
    run(&mut s, &["mkdir B", "cd B", "name B1"]);

    let err = s.execute("complete").unwrap_err();
    assert!(matches!(err, StoreError::AheadOfParent { ahead: 1, .. }));

    run(&mut s, &["cd ..", "merge B", "cd B", "complete"]);
    let b = s.store().current();
    assert!(b.is_completed);
    assert_eq!(ahead_behind(&s), (0, 0));

    assert!(matches!(
        s.execute("name B2").unwrap_err(),
        StoreError::CompletedBranch(_)
    ));
    // Completing is not something the parent has to merge.
    run(&mut s, &["cd .."]);
    assert!(matches!(
        s.execute("merge B").unwrap_err(),
        StoreError::NothingToMerge(_)
    ));
}

#[test]
fn test_structural_payloads_cannot_be_appended_directly() {
    let mut store = memory_store("A");
    let root = store.root_id();
    let err = store
        .append(Payload::Merge {
            from_id: root,
            min_seq: 0,
            max_seq: 0,
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidCommand(_)));
    assert_eq!(store.current().command_count, 1);
}

#[test]
fn test_custom_payloads_are_leaves() {
    let mut store = memory_store("A");
    let mut fields = BTreeMap::new();
    fields.insert("shape".to_string(), "circle".to_string());
    let record = store
        .append(Payload::Custom {
            kind: "AddShape".to_string(),
            fields,
        })
        .unwrap();
    assert_eq!(record.sequence, 1);
    assert_eq!(record.kind(), "AddShape");

    let stream = store.stream(&store.root_id()).unwrap();
    assert_eq!(stream.len(), 2);
    assert!(stream.names().is_empty());
}

#[test]
fn test_checkout_paths() {
    let mut s = memory_session("A");
    run(&mut s, &["mkdir B", "cd B", "mkdir C", "cd C"]);
    assert_eq!(s.store().branch_path(&s.store().current_id()), "B/C");

    run(&mut s, &["cd ../.."]);
    assert_eq!(s.store().current_id(), s.store().root_id());

    run(&mut s, &["cd /B/C", "cd /"]);
    assert_eq!(s.store().current_id(), s.store().root_id());

    run(&mut s, &["cd B/C", "cd ../../B"]);
    assert_eq!(s.store().current().name, "B");
    assert!(matches!(
        s.execute("cd ../..").unwrap_err(),
        StoreError::BranchNotFound(_)
    ));
}
