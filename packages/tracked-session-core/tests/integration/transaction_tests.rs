//! Nested transactions and log pruning.

use std::rc::Rc;

use ntest::timeout;
use tracked_session_core::{MemoryBackend, OperationKind, TrackingError};

use super::helpers::{close_and_take, tracked_session, FailingBackend, Item, ITEM};

#[timeout(1000)]
#[test]
fn test_abort_without_transaction_fails() {
    let (mut session, _captured) = tracked_session(MemoryBackend::new());
    assert!(matches!(
        session.abort_transaction(),
        Err(TrackingError::NoActiveTransaction)
    ));
    assert!(matches!(
        session.complete_transaction(),
        Err(TrackingError::NoActiveTransaction)
    ));
}

#[timeout(1000)]
#[test]
fn test_completed_transaction_is_committed_and_reported() {
    let (mut session, captured) = tracked_session(MemoryBackend::new());
    session.begin_transaction().unwrap();
    session.insert(&Item::new(1, 1, "A")).unwrap();
    session.complete_transaction().unwrap();

    assert_eq!(session.backend().commits(), 1);
    assert_eq!(session.backend().committed_len(ITEM), 1);

    let changes = close_and_take(session, &captured).unwrap();
    assert_eq!(
        changes.record(ITEM, &Item::key(1, 1)).unwrap().state(),
        OperationKind::Inserted
    );
}

#[timeout(1000)]
#[test]
fn test_abort_discards_scope_but_keeps_prior_attach() {
    let mut backend = MemoryBackend::new();
    backend.seed(&Item::new(1, 1, "Seed")).unwrap();
    let (mut session, captured) = tracked_session(backend);

    let row = session
        .fetch(&Item::table(), &Item::key(1, 1))
        .unwrap()
        .unwrap();
    session.begin_transaction().unwrap();
    session.delete(&row).unwrap();
    session.insert(&Item::new(2, 2, "B")).unwrap();
    session.abort_transaction().unwrap();

    assert_eq!(session.log().len(), 1);
    assert_eq!(session.backend().rollbacks(), 1);
    assert_eq!(session.backend().committed_len(ITEM), 1);

    let changes = close_and_take(session, &captured).unwrap();
    let table = changes.table(ITEM).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(
        table.get(&Item::key(1, 1)).unwrap().state(),
        OperationKind::Attached
    );
}

#[timeout(1000)]
#[test]
fn test_nested_abort_propagates_through_outer_complete() {
    let (mut session, captured) = tracked_session(MemoryBackend::new());

    session.begin_transaction().unwrap();
    session.insert(&Item::new(1, 1, "Outer")).unwrap();
    session.begin_transaction().unwrap();
    session.insert(&Item::new(2, 2, "Inner")).unwrap();
    session.abort_transaction().unwrap();
    assert_eq!(session.log().len(), 1);

    session.insert(&Item::new(3, 3, "After")).unwrap();
    session.complete_transaction().unwrap();

    assert!(session.log().is_empty());
    assert_eq!(session.backend().commits(), 0);
    assert_eq!(session.backend().rollbacks(), 1);
    assert_eq!(session.backend().committed_len(ITEM), 0);

    let changes = close_and_take(session, &captured).unwrap();
    assert!(changes.is_empty());
}

#[timeout(1000)]
#[test]
fn test_abort_removes_completed_inner_scopes() {
    let (mut session, captured) = tracked_session(MemoryBackend::new());

    session.insert(&Item::new(9, 9, "Before")).unwrap();
    session.begin_transaction().unwrap();
    session.insert(&Item::new(1, 1, "A")).unwrap();
    session.begin_transaction().unwrap();
    session.insert(&Item::new(2, 2, "B")).unwrap();
    session.begin_transaction().unwrap();
    session.insert(&Item::new(3, 3, "C")).unwrap();
    session.complete_transaction().unwrap();
    session.complete_transaction().unwrap();
    assert_eq!(session.log().len(), 4);

    session.abort_transaction().unwrap();
    assert_eq!(session.log().len(), 1);
    assert_eq!(session.transaction_depth(), 0);

    let changes = close_and_take(session, &captured).unwrap();
    let table = changes.table(ITEM).unwrap();
    assert_eq!(table.len(), 1);
    assert!(table.get(&Item::key(9, 9)).is_some());
}

#[timeout(1000)]
#[test]
fn test_new_outer_transaction_after_abort_commits() {
    let (mut session, captured) = tracked_session(MemoryBackend::new());

    session.begin_transaction().unwrap();
    session.insert(&Item::new(1, 1, "A")).unwrap();
    session.abort_transaction().unwrap();

    session.begin_transaction().unwrap();
    session.insert(&Item::new(2, 2, "B")).unwrap();
    session.complete_transaction().unwrap();

    assert_eq!(session.backend().commits(), 1);
    let changes = close_and_take(session, &captured).unwrap();
    let table = changes.table(ITEM).unwrap();
    assert!(table.get(&Item::key(1, 1)).is_none());
    assert!(table.get(&Item::key(2, 2)).is_some());
}

#[timeout(1000)]
#[test]
fn test_failed_commit_discards_transaction_entries() {
    let (mut session, captured) = tracked_session(FailingBackend::default());
    session.insert(&Item::new(9, 9, "Before")).unwrap();

    session.begin_transaction().unwrap();
    session.insert(&Item::new(1, 1, "A")).unwrap();
    session.backend_mut().fail_commit = true;
    assert!(matches!(
        session.complete_transaction(),
        Err(TrackingError::Backend(_))
    ));
    assert_eq!(session.log().len(), 1);
    assert_eq!(session.backend().closes.get(), 1);
    assert!(!session.backend().inner.in_transaction());
    assert_eq!(session.backend().inner.committed_len(ITEM), 1);

    let changes = close_and_take(session, &captured).unwrap();
    let table = changes.table(ITEM).unwrap();
    assert_eq!(table.len(), 1);
    assert!(table.get(&Item::key(1, 1)).is_none());
}

#[timeout(1000)]
#[test]
fn test_failed_rollback_still_closes_backend() {
    let (mut session, captured) = tracked_session(FailingBackend::default());

    session.begin_transaction().unwrap();
    session.insert(&Item::new(1, 1, "A")).unwrap();
    session.backend_mut().fail_rollback = true;
    assert!(matches!(
        session.abort_transaction(),
        Err(TrackingError::Backend(_))
    ));
    assert_eq!(session.backend().closes.get(), 1);
    assert!(!session.backend().inner.in_transaction());
    assert!(session.log().is_empty());

    session.begin_transaction().unwrap();
    session.insert(&Item::new(2, 2, "B")).unwrap();
    session.complete_transaction().unwrap();
    assert_eq!(session.backend().inner.commits(), 1);

    let changes = close_and_take(session, &captured).unwrap();
    let table = changes.table(ITEM).unwrap();
    assert_eq!(table.len(), 1);
    assert!(table.get(&Item::key(2, 2)).is_some());
}

#[timeout(1000)]
#[test]
fn test_failed_rollback_at_close_still_closes_backend() {
    let backend = FailingBackend::default();
    let closes = Rc::clone(&backend.closes);
    let (mut session, captured) = tracked_session(backend);

    session.insert(&Item::new(9, 9, "Before")).unwrap();
    session.begin_transaction().unwrap();
    session.insert(&Item::new(1, 1, "A")).unwrap();
    session.backend_mut().fail_rollback = true;

    assert!(matches!(session.close(), Err(TrackingError::Backend(_))));
    assert_eq!(closes.get(), 1);

    let changes = captured.borrow_mut().take().unwrap();
    let table = changes.table(ITEM).unwrap();
    assert_eq!(table.len(), 1);
    assert!(table.get(&Item::key(9, 9)).is_some());
}
