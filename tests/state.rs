// tests/state.rs

//! StateDB history tests: ID allocation, selections, persistence.

use moss::{Mutability, SelectionFlags, SelectionType, StateDb, StateEntry, StateType};

#[test]
fn test_state_allocation_and_active_state() {
    let temp = tempfile::tempdir().unwrap();
    let mut db = StateDb::connect(temp.path().join("state.db"), Mutability::ReadWrite).unwrap();

    assert_eq!(db.active_state().unwrap(), None);

    let first = db
        .new_state("initial", "bootstrap state", StateType::Transaction)
        .unwrap();
    let second = db
        .new_state("install foo", "", StateType::Transaction)
        .unwrap();
    assert_eq!(first, 1);
    assert_eq!(second, 2);
    assert_eq!(db.active_state().unwrap(), Some(2));

    let record = db.state(first).unwrap().unwrap();
    assert_eq!(record.name, "initial");
    assert_eq!(record.state_type, StateType::Transaction);
    assert!(record.timestamp > 0);
}

#[test]
fn test_ids_keep_increasing_over_many_states() {
    let temp = tempfile::tempdir().unwrap();
    let mut db = StateDb::connect(temp.path().join("state.db"), Mutability::ReadWrite).unwrap();

    let mut last = 0;
    for i in 0..20 {
        let id = db
            .new_state(&format!("state {i}"), "", StateType::Automatic)
            .unwrap();
        assert!(id > last);
        last = id;
    }
    assert_eq!(db.active_state().unwrap(), Some(last));
    assert_eq!(db.states().unwrap().len(), 20);
}

#[test]
fn test_selection_lifecycle() {
    let temp = tempfile::tempdir().unwrap();
    let mut db = StateDb::connect(temp.path().join("state.db"), Mutability::ReadWrite).unwrap();
    let state = db
        .new_state("install foo", "", StateType::Transaction)
        .unwrap();

    db.mark_selection(
        state,
        "foo",
        SelectionType::Binary,
        SelectionFlags::USER_INSTALLED,
    )
    .unwrap();

    let entries = db.entries(state).unwrap();
    assert_eq!(
        entries,
        vec![StateEntry {
            state_id: state,
            identifier: "foo".to_string(),
            selection: SelectionType::Binary,
            flags: SelectionFlags::USER_INSTALLED,
        }]
    );

    // Re-marking replaces the previous entry
    db.mark_selection(
        state,
        "foo",
        SelectionType::Source,
        SelectionFlags::USER_INSTALLED | SelectionFlags::PREFER_SOURCE,
    )
    .unwrap();
    let entries = db.entries(state).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].selection, SelectionType::Source);
    assert!(entries[0].flags.contains(SelectionFlags::PREFER_SOURCE));

    db.unmark_selection(state, "foo").unwrap();
    assert!(db.entries(state).unwrap().is_empty());
}

#[test]
fn test_rollback_is_a_new_state() {
    let temp = tempfile::tempdir().unwrap();
    let mut db = StateDb::connect(temp.path().join("state.db"), Mutability::ReadWrite).unwrap();

    let selections = vec![
        (
            "nano".to_string(),
            SelectionType::Binary,
            SelectionFlags::USER_INSTALLED,
        ),
        (
            "ncurses".to_string(),
            SelectionType::Binary,
            SelectionFlags::DEP_INSTALLED,
        ),
    ];
    let original = db
        .new_state_with("install nano", "", StateType::Transaction, &selections)
        .unwrap();

    let _interim = db
        .new_state("remove nano", "", StateType::Transaction)
        .unwrap();

    // A rollback mirrors the old selections under a fresh ID
    let mirrored: Vec<_> = db
        .entries(original)
        .unwrap()
        .into_iter()
        .map(|e| (e.identifier, e.selection, e.flags))
        .collect();
    let rollback = db
        .new_state_with(
            "rollback to state 1",
            "",
            StateType::Snapshot,
            &mirrored,
        )
        .unwrap();

    assert!(rollback > original);
    assert_eq!(db.active_state().unwrap(), Some(rollback));
    assert_eq!(
        db.entries(rollback).unwrap().len(),
        db.entries(original).unwrap().len()
    );
}

#[test]
fn test_history_survives_reopen() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("state.db");

    {
        let mut db = StateDb::connect(&path, Mutability::ReadWrite).unwrap();
        let state = db
            .new_state("install foo", "", StateType::Transaction)
            .unwrap();
        db.mark_selection(
            state,
            "foo",
            SelectionType::Binary,
            SelectionFlags::USER_INSTALLED,
        )
        .unwrap();
        db.close();
    }

    let db = StateDb::connect(&path, Mutability::ReadOnly).unwrap();
    assert_eq!(db.active_state().unwrap(), Some(1));
    let entries = db.entries(1).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].identifier, "foo");
}

#[test]
fn test_binary_round_trip_for_many_entries() {
    for (state_id, identifier, selection, flags) in [
        (1u64, "a", SelectionType::Source, SelectionFlags::USER_INSTALLED),
        (
            u64::MAX,
            "package-with-a-much-longer-name",
            SelectionType::Binary,
            SelectionFlags::DEP_INSTALLED | SelectionFlags::HOLD,
        ),
        (
            7,
            "unicode-päckage",
            SelectionType::Binary,
            SelectionFlags::USER_INSTALLED
                | SelectionFlags::PREFER_SOURCE
                | SelectionFlags::DEFAULT_POLICY,
        ),
    ] {
        let entry = StateEntry {
            state_id,
            identifier: identifier.to_string(),
            selection,
            flags,
        };
        assert_eq!(StateEntry::decode(&entry.encode()).unwrap(), entry);
    }
}
