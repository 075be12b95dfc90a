//! Replays a change log into a `DatabaseChangeSet`.
//!
//! Each entry moves the change set of its `(table, primary key)` pair
//! through the transitions below. Inconsistent usage never fails the
//! replay; it is recorded as an `Issue` on the record.
//!
//! | Current            | Event    | Result                         |
//! |--------------------|----------|--------------------------------|
//! | absent / Attached  | Attached | Attached, fields prev = cur    |
//! | other              | Attached | unchanged, issue               |
//! | absent             | Inserted | Inserted, fields prev = null   |
//! | any                | Inserted | unchanged, issue               |
//! | absent             | Updated  | Updated, prev = null, issue    |
//! | Inserted           | Updated  | Inserted, current values merged|
//! | Attached / Updated | Updated  | Updated, current values merged |
//! | Deleted            | Updated  | unchanged, issue               |
//! | Inserted           | Deleted  | record removed                 |
//! | Attached / Updated | Deleted  | Deleted, cur = null            |
//! | absent             | Deleted  | Deleted, cur = null, issue     |
//! | Deleted            | Deleted  | unchanged, issue               |

use crate::change_log::{ChangeLogEntry, OperationKind};
use crate::change_set::{DatabaseChangeSet, FieldChange, Issue, RecordChangeSet, TableChangeSet};
use crate::primary_key::PrimaryKeyValue;
use crate::record::RecordSnapshot;
use crate::value::Value;

/// Change log replay state machine.
#[derive(Debug, Clone)]
pub struct Consolidator {
    default_schema: String,
}

impl Consolidator {
    /// Creates a consolidator.
    ///
    /// # Arguments
    /// * `default_schema` - Schema used in table keys when metadata declares none
    pub fn new(default_schema: impl Into<String>) -> Self {
        Self {
            default_schema: default_schema.into(),
        }
    }

    /// Replays `entries` in order and returns the consolidated change set.
    ///
    /// Unchanged fields are pruned and tables left without records are
    /// dropped before returning.
    pub fn consolidate(&self, entries: &[ChangeLogEntry]) -> DatabaseChangeSet {
        let mut changes = DatabaseChangeSet::default();

        for entry in entries {
            let snapshot = entry.snapshot();
            let table_key = snapshot.metadata().table_key(&self.default_schema);
            let key = snapshot.primary_key();
            let table = changes.table_entry(table_key.clone());
            apply(table, &table_key, key, snapshot, entry.kind());
        }

        changes.eliminate();

        tracing::debug!(
            "Consolidated {} log entries into {} records across {} tables",
            entries.len(),
            changes.record_count(),
            changes.len()
        );

        changes
    }
}

fn apply(
    table: &mut TableChangeSet,
    table_key: &str,
    key: PrimaryKeyValue,
    snapshot: &RecordSnapshot,
    kind: OperationKind,
) {
    use OperationKind::*;

    let current = table.get(&key).map(RecordChangeSet::state);

    match (current, kind) {
        (None, Attached) => table.insert(key, attached(snapshot)),
        (Some(Attached), Attached) => replace(table, key, attached(snapshot)),
        (Some(state), Attached) | (Some(state), Inserted) => {
            let description = format!(
                "{} record {} is already attached with {} state",
                table_key, key, state
            );
            raise(table, &key, snapshot, description);
        }

        (None, Inserted) => table.insert(key, inserted(snapshot)),

        (None, Updated) => {
            table.insert(key.clone(), updated(snapshot));
            let description = format!("{} record {} has not been attached", table_key, key);
            raise(table, &key, snapshot, description);
        }
        (Some(Deleted), Updated) => {
            let description = format!("{} record {} has already been deleted", table_key, key);
            raise(table, &key, snapshot, description);
        }
        (Some(_), Updated) => {
            if let Some(record) = table.get_mut(&key) {
                merge_update(record, snapshot);
            }
        }

        (Some(Inserted), Deleted) => {
            table.remove(&key);
        }
        (Some(Deleted), Deleted) => {
            let description = format!("{} record {} has already been deleted", table_key, key);
            raise(table, &key, snapshot, description);
        }
        (Some(_), Deleted) => replace(table, key, deleted(snapshot)),
        (None, Deleted) => {
            table.insert(key.clone(), deleted(snapshot));
            let description = format!("{} record {} has not been attached", table_key, key);
            raise(table, &key, snapshot, description);
        }
    }
}

/// Replaces a record's state and fields, carrying its issues over.
fn replace(table: &mut TableChangeSet, key: PrimaryKeyValue, mut record: RecordChangeSet) {
    if let Some(previous) = table.remove(&key) {
        for issue in previous.issues() {
            record.push_issue(issue.clone());
        }
    }
    table.insert(key, record);
}

fn raise(
    table: &mut TableChangeSet,
    key: &PrimaryKeyValue,
    snapshot: &RecordSnapshot,
    description: String,
) {
    tracing::warn!("{}", description);
    if let Some(record) = table.get_mut(key) {
        record.push_issue(Issue {
            description,
            snapshot: snapshot.clone(),
        });
    }
}

fn with_fields<F>(state: OperationKind, snapshot: &RecordSnapshot, field: F) -> RecordChangeSet
where
    F: Fn(&Value) -> FieldChange,
{
    let mut record = RecordChangeSet::new(state);
    let fields = record.fields_mut();
    for (column, value) in snapshot.columns() {
        fields.insert(column.to_string(), field(value));
    }
    record
}

fn attached(snapshot: &RecordSnapshot) -> RecordChangeSet {
    with_fields(OperationKind::Attached, snapshot, |v| {
        FieldChange::new(v.clone(), v.clone())
    })
}

fn inserted(snapshot: &RecordSnapshot) -> RecordChangeSet {
    with_fields(OperationKind::Inserted, snapshot, |v| {
        FieldChange::new(Value::Null, v.clone())
    })
}

fn updated(snapshot: &RecordSnapshot) -> RecordChangeSet {
    with_fields(OperationKind::Updated, snapshot, |v| {
        FieldChange::new(Value::Null, v.clone())
    })
}

fn deleted(snapshot: &RecordSnapshot) -> RecordChangeSet {
    with_fields(OperationKind::Deleted, snapshot, |v| {
        FieldChange::new(v.clone(), Value::Null)
    })
}

/// Sets every field's current value from `snapshot`, keeping the previous one.
///
/// Inserted records stay Inserted; Attached records become Updated.
fn merge_update(record: &mut RecordChangeSet, snapshot: &RecordSnapshot) {
    if record.state() != OperationKind::Inserted {
        record.set_state(OperationKind::Updated);
    }

    let fields = record.fields_mut();
    for (column, value) in snapshot.columns() {
        fields
            .entry(column.to_string())
            .and_modify(|change| change.current = value.clone())
            .or_insert_with(|| FieldChange::new(Value::Null, value.clone()));
    }
}
