//! Record operations through a tracked session.

use std::sync::Arc;

use ntest::timeout;
use tracked_session_core::{
    FieldChange, MemoryBackend, OperationKind, PrimaryKeyValue, Record, Row, TableMetadata,
    TrackingError, Value,
};

use super::helpers::{close_and_take, text, tracked_session, Item, ITEM};

#[timeout(1000)]
#[test]
fn test_fetch_without_changes_reports_attached() {
    let mut backend = MemoryBackend::new();
    backend.seed(&Item::new(1, 2, "First")).unwrap();
    let (mut session, captured) = tracked_session(backend);

    let row = session.fetch(&Item::table(), &Item::key(1, 2)).unwrap();
    assert!(row.is_some());

    let changes = close_and_take(session, &captured).unwrap();
    let record = changes.record(ITEM, &Item::key(1, 2)).unwrap();
    assert_eq!(record.state(), OperationKind::Attached);
    assert!(record.fields().is_empty());
    assert!(record.issues().is_empty());
}

#[timeout(1000)]
#[test]
fn test_fetch_miss_records_nothing() {
    let (mut session, captured) = tracked_session(MemoryBackend::new());
    assert!(session
        .fetch(&Item::table(), &Item::key(9, 9))
        .unwrap()
        .is_none());
    assert!(session.log().is_empty());

    let changes = close_and_take(session, &captured).unwrap();
    assert!(changes.is_empty());
}

#[timeout(1000)]
#[test]
fn test_insert_reports_new_values() {
    let (mut session, captured) = tracked_session(MemoryBackend::new());
    session.insert(&Item::new(1, 2, "First")).unwrap();

    let changes = close_and_take(session, &captured).unwrap();
    let record = changes.record(ITEM, &Item::key(1, 2)).unwrap();
    assert_eq!(record.state(), OperationKind::Inserted);
    assert_eq!(
        record.field("Id1"),
        Some(&FieldChange::new(Value::Null, Value::Int(1)))
    );
    assert_eq!(
        record.field("Id2"),
        Some(&FieldChange::new(Value::Null, Value::Int(2)))
    );
    assert_eq!(
        record.field("Name"),
        Some(&FieldChange::new(Value::Null, text("First")))
    );
    assert!(record.field("Description").is_none());
    assert!(record.issues().is_empty());
}

#[timeout(1000)]
#[test]
fn test_attach_then_update_description() {
    let mut item = Item::new(1, 2, "First");
    let mut backend = MemoryBackend::new();
    backend.seed(&item).unwrap();
    let (mut session, captured) = tracked_session(backend);

    session.record_attach(&item).unwrap();
    item.description = Some("New description".to_string());
    session.update(&item).unwrap();

    let changes = close_and_take(session, &captured).unwrap();
    let record = changes.record(ITEM, &Item::key(1, 2)).unwrap();
    assert_eq!(record.state(), OperationKind::Updated);
    assert_eq!(record.fields().len(), 1);
    assert_eq!(
        record.field("Description"),
        Some(&FieldChange::new(Value::Null, text("New description")))
    );
}

#[timeout(1000)]
#[test]
fn test_insert_then_updates_remain_inserted() {
    let (mut session, captured) = tracked_session(MemoryBackend::new());
    let mut item = Item::new(1, 2, "First");
    session.insert(&item).unwrap();
    item.name = "X".to_string();
    session.update(&item).unwrap();
    item.description = Some("Y".to_string());
    session.update(&item).unwrap();

    let changes = close_and_take(session, &captured).unwrap();
    let record = changes.record(ITEM, &Item::key(1, 2)).unwrap();
    assert_eq!(record.state(), OperationKind::Inserted);
    assert_eq!(record.field("Name"), Some(&FieldChange::new(Value::Null, text("X"))));
    assert_eq!(
        record.field("Description"),
        Some(&FieldChange::new(Value::Null, text("Y")))
    );
    assert_eq!(
        record.field("Id1"),
        Some(&FieldChange::new(Value::Null, Value::Int(1)))
    );
    assert_eq!(
        record.field("Id2"),
        Some(&FieldChange::new(Value::Null, Value::Int(2)))
    );
}

#[timeout(1000)]
#[test]
fn test_delete_by_id_on_untracked_key() {
    let mut backend = MemoryBackend::new();
    backend.seed(&Item::new(1, 2, "Stored")).unwrap();
    let (mut session, captured) = tracked_session(backend);

    session.delete_by_id(&Item::table(), &Item::key(1, 2)).unwrap();
    assert!(session.backend().get(&Item::table(), &Item::key(1, 2)).is_none());

    let changes = close_and_take(session, &captured).unwrap();
    let record = changes.record(ITEM, &Item::key(1, 2)).unwrap();
    assert_eq!(record.state(), OperationKind::Deleted);
    assert_eq!(record.issues().len(), 1);
    assert!(record.issues()[0]
        .description
        .contains("has not been attached"));
    assert_eq!(
        record.field("Name"),
        Some(&FieldChange::new(text("Stored"), Value::Null))
    );
    assert_eq!(
        record.field("Id1"),
        Some(&FieldChange::new(Value::Int(1), Value::Null))
    );
}

#[timeout(1000)]
#[test]
fn test_delete_by_id_missing_key() {
    let (mut session, _captured) = tracked_session(MemoryBackend::new());
    let result = session.delete_by_id(&Item::table(), &Item::key(1, 2));
    assert!(matches!(result, Err(TrackingError::RecordNotFound { .. })));
    assert!(session.log().is_empty());
}

#[timeout(1000)]
#[test]
fn test_failed_backend_call_is_not_recorded() {
    let mut backend = MemoryBackend::new();
    backend.seed(&Item::new(1, 2, "First")).unwrap();
    let (mut session, captured) = tracked_session(backend);

    let result = session.insert(&Item::new(1, 2, "Again"));
    assert!(matches!(result, Err(TrackingError::DuplicateKey { .. })));
    assert!(session.log().is_empty());

    let changes = close_and_take(session, &captured).unwrap();
    assert!(changes.is_empty());
}

#[timeout(1000)]
#[test]
fn test_insert_then_delete_leaves_no_table() {
    let (mut session, captured) = tracked_session(MemoryBackend::new());
    let item = Item::new(1, 2, "Temp");
    session.insert(&item).unwrap();
    session.delete(&item).unwrap();

    let changes = close_and_take(session, &captured).unwrap();
    assert!(changes.table(ITEM).is_none());
}

#[timeout(1000)]
#[test]
fn test_attached_then_deleted_reports_previous_values() {
    let mut backend = MemoryBackend::new();
    backend.seed(&Item::new(1, 2, "Old")).unwrap();
    let (mut session, captured) = tracked_session(backend);

    let row = session
        .fetch(&Item::table(), &Item::key(1, 2))
        .unwrap()
        .unwrap();
    session.delete(&row).unwrap();

    let changes = close_and_take(session, &captured).unwrap();
    let record = changes.record(ITEM, &Item::key(1, 2)).unwrap();
    assert_eq!(record.state(), OperationKind::Deleted);
    assert!(record.issues().is_empty());
    assert_eq!(
        record.field("Name"),
        Some(&FieldChange::new(text("Old"), Value::Null))
    );
}

#[timeout(1000)]
#[test]
fn test_update_without_attach_issue_persists() {
    let mut backend = MemoryBackend::new();
    backend.seed(&Item::new(1, 2, "A")).unwrap();
    let (mut session, captured) = tracked_session(backend);

    let mut item = Item::new(1, 2, "B");
    session.update(&item).unwrap();
    item.name = "C".to_string();
    session.update(&item).unwrap();

    let changes = close_and_take(session, &captured).unwrap();
    let record = changes.record(ITEM, &Item::key(1, 2)).unwrap();
    assert_eq!(record.state(), OperationKind::Updated);
    assert_eq!(record.issues().len(), 1);
    assert!(record.issues()[0]
        .description
        .contains("has not been attached"));
    assert_eq!(record.field("Name"), Some(&FieldChange::new(Value::Null, text("C"))));
}

#[timeout(1000)]
#[test]
fn test_byte_keyed_table() {
    let blobs = Arc::new(
        TableMetadata::new("Blob", ["Hash", "Size"], ["Hash"])
            .unwrap()
            .with_schema("store"),
    );
    let (mut session, captured) = tracked_session(MemoryBackend::new());
    let row = Row::from_pairs(
        blobs,
        [("Hash", Value::Bytes(vec![1, 2, 3])), ("Size", Value::Int(3))],
    )
    .unwrap();
    session.insert(&row).unwrap();

    let changes = close_and_take(session, &captured).unwrap();
    let key = PrimaryKeyValue::new(vec![Value::Bytes(vec![1, 2, 3])]);
    assert_eq!(key.canonical_form(), "[0x010203]");
    let record = changes.record("[store].[Blob]", &key).unwrap();
    assert_eq!(record.state(), OperationKind::Inserted);
}

#[timeout(1000)]
#[test]
fn test_change_set_json_shape() {
    let (mut session, captured) = tracked_session(MemoryBackend::new());
    session.insert(&Item::new(1, 2, "First")).unwrap();

    let changes = close_and_take(session, &captured).unwrap();
    let json = serde_json::to_value(&changes).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "[dbo].[Item]": {
                "[1,2]": {
                    "state": "Inserted",
                    "fields": {
                        "Id1": { "previous": null, "current": 1 },
                        "Id2": { "previous": null, "current": 2 },
                        "Name": { "previous": null, "current": "First" }
                    },
                    "issues": []
                }
            }
        })
    );
}

/// Record whose values omit trailing columns of its table.
struct Truncated;

impl Record for Truncated {
    fn metadata(&self) -> Arc<TableMetadata> {
        Item::table()
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::Int(1)]
    }
}

#[timeout(1000)]
#[test]
fn test_malformed_record_is_rejected() {
    let (mut session, captured) = tracked_session(MemoryBackend::new());

    assert!(matches!(
        session.record_attach(&Truncated),
        Err(TrackingError::InvalidRecord(_))
    ));
    assert!(matches!(
        session.insert(&Truncated),
        Err(TrackingError::InvalidRecord(_))
    ));
    assert!(session.log().is_empty());
    assert_eq!(session.backend().committed_len(ITEM), 0);

    let changes = close_and_take(session, &captured).unwrap();
    assert!(changes.is_empty());
}
