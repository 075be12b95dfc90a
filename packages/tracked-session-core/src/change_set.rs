//! Consolidated change report.
//!
//! `DatabaseChangeSet` maps table keys (`[schema].[table]`) to
//! `TableChangeSet`s, which map primary keys to `RecordChangeSet`s.
//! Tables and records keep the order in which they were first seen.

use indexmap::IndexMap;
use serde::Serialize;

use crate::change_log::OperationKind;
use crate::primary_key::PrimaryKeyValue;
use crate::record::RecordSnapshot;
use crate::value::Value;

/// Before/after value pair for one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    /// Value before the tracked operations
    pub previous: Value,
    /// Value after the tracked operations
    pub current: Value,
}

impl FieldChange {
    /// Creates a field change.
    pub fn new(previous: Value, current: Value) -> Self {
        Self { previous, current }
    }

    /// Returns `true` if previous and current values are equal.
    pub fn is_unchanged(&self) -> bool {
        self.previous == self.current
    }
}

/// Non-fatal anomaly found while replaying one record's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    /// Human-readable description
    pub description: String,
    /// Snapshot of the log entry that raised the issue
    pub snapshot: RecordSnapshot,
}

/// Net change of one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordChangeSet {
    state: OperationKind,
    fields: IndexMap<String, FieldChange>,
    issues: Vec<Issue>,
}

impl RecordChangeSet {
    pub(crate) fn new(state: OperationKind) -> Self {
        Self {
            state,
            fields: IndexMap::new(),
            issues: Vec::new(),
        }
    }

    /// Returns the record state.
    pub fn state(&self) -> OperationKind {
        self.state
    }

    /// Returns the changed fields in declared column order.
    pub fn fields(&self) -> &IndexMap<String, FieldChange> {
        &self.fields
    }

    /// Returns the change of one field.
    pub fn field(&self, column: &str) -> Option<&FieldChange> {
        self.fields.get(column)
    }

    /// Returns the issues in the order they were raised.
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub(crate) fn set_state(&mut self, state: OperationKind) {
        self.state = state;
    }

    pub(crate) fn fields_mut(&mut self) -> &mut IndexMap<String, FieldChange> {
        &mut self.fields
    }

    pub(crate) fn push_issue(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    /// Drops fields whose value did not change. State and issues are kept.
    pub(crate) fn eliminate_unchanged(&mut self) {
        self.fields.retain(|_, change| !change.is_unchanged());
    }
}

/// Changes of all tracked records in one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TableChangeSet {
    records: IndexMap<PrimaryKeyValue, RecordChangeSet>,
}

impl TableChangeSet {
    /// Returns the change set of a record.
    pub fn get(&self, key: &PrimaryKeyValue) -> Option<&RecordChangeSet> {
        self.records.get(key)
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no record is tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates records in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&PrimaryKeyValue, &RecordChangeSet)> {
        self.records.iter()
    }

    pub(crate) fn get_mut(&mut self, key: &PrimaryKeyValue) -> Option<&mut RecordChangeSet> {
        self.records.get_mut(key)
    }

    pub(crate) fn insert(&mut self, key: PrimaryKeyValue, record: RecordChangeSet) {
        self.records.insert(key, record);
    }

    pub(crate) fn remove(&mut self, key: &PrimaryKeyValue) -> Option<RecordChangeSet> {
        self.records.shift_remove(key)
    }
}

/// Changes of all tracked tables in one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DatabaseChangeSet {
    tables: IndexMap<String, TableChangeSet>,
}

impl DatabaseChangeSet {
    /// Returns the change set of a table by its `[schema].[table]` key.
    pub fn table(&self, table_key: &str) -> Option<&TableChangeSet> {
        self.tables.get(table_key)
    }

    /// Returns the change set of one record.
    pub fn record(&self, table_key: &str, key: &PrimaryKeyValue) -> Option<&RecordChangeSet> {
        self.table(table_key).and_then(|table| table.get(key))
    }

    /// Returns the number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns `true` if no table has changes.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Returns the number of records across all tables.
    pub fn record_count(&self) -> usize {
        self.tables.values().map(TableChangeSet::len).sum()
    }

    /// Iterates tables in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TableChangeSet)> {
        self.tables.iter().map(|(key, table)| (key.as_str(), table))
    }

    pub(crate) fn table_entry(&mut self, table_key: String) -> &mut TableChangeSet {
        self.tables.entry(table_key).or_default()
    }

    /// Prunes unchanged fields, then empty tables.
    pub(crate) fn eliminate(&mut self) {
        for table in self.tables.values_mut() {
            for record in table.records.values_mut() {
                record.eliminate_unchanged();
            }
        }
        self.tables.retain(|_, table| !table.is_empty());
    }
}
