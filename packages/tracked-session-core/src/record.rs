//! Record metadata, trackable records and immutable snapshots.

use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::{TrackingError, TrackingResult};
use crate::primary_key::PrimaryKeyValue;
use crate::value::Value;

/// Table-level description of a record type.
///
/// # Invariants
///
/// - `columns` is non-empty and holds no duplicates
/// - `primary_key` is non-empty and every entry names a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    schema: Option<String>,
    name: String,
    columns: Vec<String>,
    /// Column indices of the primary key, in declared key order
    primary_key: Vec<usize>,
}

impl TableMetadata {
    /// Creates table metadata without an explicit schema.
    ///
    /// # Arguments
    /// * `name` - Table name
    /// * `columns` - Column names in declared order
    /// * `primary_key` - Primary key column names in declared key order
    ///
    /// # Returns
    /// `TrackingResult<TableMetadata>`, failing with `InvalidRecord` when the
    /// primary key is empty or names an unknown column.
    pub fn new<C, K>(name: impl Into<String>, columns: C, primary_key: K) -> TrackingResult<Self>
    where
        C: IntoIterator,
        C::Item: Into<String>,
        K: IntoIterator,
        K::Item: AsRef<str>,
    {
        let name = name.into();
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();

        for (i, column) in columns.iter().enumerate() {
            if columns[..i].contains(column) {
                return Err(TrackingError::InvalidRecord(format!(
                    "column '{}' declared twice in table '{}'",
                    column, name
                )));
            }
        }

        let primary_key = primary_key
            .into_iter()
            .map(|key| {
                let key = key.as_ref();
                columns.iter().position(|c| c == key).ok_or_else(|| {
                    TrackingError::InvalidRecord(format!(
                        "primary key column '{}' is not a column of table '{}'",
                        key, name
                    ))
                })
            })
            .collect::<TrackingResult<Vec<_>>>()?;

        if primary_key.is_empty() {
            return Err(TrackingError::InvalidRecord(format!(
                "table '{}' declares no primary key columns",
                name
            )));
        }

        Ok(Self {
            schema: None,
            name,
            columns,
            primary_key,
        })
    }

    /// Sets the schema name.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Returns the schema name, if declared.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the column names in declared order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the index of a column by name.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Returns the table key `[schema].[table]`.
    ///
    /// # Arguments
    /// * `default_schema` - Schema used when none is declared
    pub fn table_key(&self, default_schema: &str) -> String {
        format!(
            "[{}].[{}]",
            self.schema.as_deref().unwrap_or(default_schema),
            self.name
        )
    }

    /// Extracts the primary key from a full row of values.
    pub(crate) fn primary_key_of(&self, values: &[Value]) -> PrimaryKeyValue {
        PrimaryKeyValue::new(
            self.primary_key
                .iter()
                .map(|&i| values.get(i).cloned().unwrap_or_default())
                .collect(),
        )
    }

    fn check_value_count(&self, count: usize) -> TrackingResult<()> {
        if count != self.columns.len() {
            return Err(TrackingError::InvalidRecord(format!(
                "table '{}' has {} columns, got {} values",
                self.name,
                self.columns.len(),
                count
            )));
        }
        Ok(())
    }

    /// Builds a primary key from key values given in declared key order.
    pub fn key_from_parts(&self, parts: Vec<Value>) -> TrackingResult<PrimaryKeyValue> {
        if parts.len() != self.primary_key.len() {
            return Err(TrackingError::InvalidRecord(format!(
                "table '{}' expects {} primary key values, got {}",
                self.name,
                self.primary_key.len(),
                parts.len()
            )));
        }
        Ok(PrimaryKeyValue::new(parts))
    }
}

/// A record type whose operations can be tracked.
///
/// Implementors copy their current column values out explicitly; the
/// recorder never holds on to the live record.
pub trait Record {
    /// Returns the table metadata of this record.
    fn metadata(&self) -> Arc<TableMetadata>;

    /// Returns a copy of the current column values in declared column order.
    fn values(&self) -> Vec<Value>;

    /// Takes an immutable snapshot of the record as it is right now.
    ///
    /// # Returns
    /// `TrackingResult<RecordSnapshot>`, failing when `values` does not match
    /// the declared columns.
    fn snapshot(&self) -> TrackingResult<RecordSnapshot> {
        RecordSnapshot::new(self.metadata(), self.values())
    }

    /// Returns the primary key of the record.
    fn primary_key(&self) -> PrimaryKeyValue {
        self.metadata().primary_key_of(&self.values())
    }
}

/// Immutable copy of a record's column values at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSnapshot {
    metadata: Arc<TableMetadata>,
    values: Arc<[Value]>,
}

impl RecordSnapshot {
    /// Creates a snapshot from values in declared column order.
    ///
    /// # Returns
    /// `TrackingResult<RecordSnapshot>`, failing when the value count does
    /// not match the column count.
    pub fn new(metadata: Arc<TableMetadata>, values: Vec<Value>) -> TrackingResult<Self> {
        metadata.check_value_count(values.len())?;
        Ok(Self {
            metadata,
            values: values.into(),
        })
    }

    /// Returns the table metadata.
    pub fn metadata(&self) -> &Arc<TableMetadata> {
        &self.metadata
    }

    /// Returns all values in declared column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Returns the value of a column by name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.metadata
            .column_index(column)
            .and_then(|i| self.values.get(i))
    }

    /// Returns the primary key of the snapshot.
    pub fn primary_key(&self) -> PrimaryKeyValue {
        self.metadata.primary_key_of(&self.values)
    }

    /// Iterates `(column, value)` pairs in declared column order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.metadata
            .columns()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl Serialize for RecordSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.columns() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Dynamically shaped record: metadata plus a mutable row of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    metadata: Arc<TableMetadata>,
    values: Vec<Value>,
}

impl Row {
    /// Creates a row from values in declared column order.
    ///
    /// # Returns
    /// `TrackingResult<Row>`, failing when the value count does not match the
    /// column count.
    pub fn new(metadata: Arc<TableMetadata>, values: Vec<Value>) -> TrackingResult<Self> {
        metadata.check_value_count(values.len())?;
        Ok(Self { metadata, values })
    }

    /// Creates a row from `(column, value)` pairs. Unset columns are null.
    pub fn from_pairs<I, C, V>(metadata: Arc<TableMetadata>, pairs: I) -> TrackingResult<Self>
    where
        I: IntoIterator<Item = (C, V)>,
        C: AsRef<str>,
        V: Into<Value>,
    {
        let mut row = Self {
            values: vec![Value::Null; metadata.columns().len()],
            metadata,
        };
        for (column, value) in pairs {
            row.set(column.as_ref(), value)?;
        }
        Ok(row)
    }

    /// Returns the value of a column by name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.metadata
            .column_index(column)
            .and_then(|i| self.values.get(i))
    }

    /// Sets the value of a column by name.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> TrackingResult<()> {
        let index = self.metadata.column_index(column).ok_or_else(|| {
            TrackingError::InvalidRecord(format!(
                "unknown column '{}' in table '{}'",
                column,
                self.metadata.name()
            ))
        })?;
        self.values[index] = value.into();
        Ok(())
    }

    /// Returns the row's values in declared column order.
    pub fn as_slice(&self) -> &[Value] {
        &self.values
    }
}

impl Record for Row {
    fn metadata(&self) -> Arc<TableMetadata> {
        Arc::clone(&self.metadata)
    }

    fn values(&self) -> Vec<Value> {
        self.values.clone()
    }
}

impl From<&RecordSnapshot> for Row {
    fn from(snapshot: &RecordSnapshot) -> Self {
        Self {
            metadata: Arc::clone(&snapshot.metadata),
            values: snapshot.values.to_vec(),
        }
    }
}
