//! In-memory session backend.
//!
//! Rows live in per-table maps keyed by primary key. Opening a transaction
//! stages a full copy of every table; commit swaps the staged copy in and
//! rollback discards it. Outside a transaction each operation applies
//! directly.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::DEFAULT_SCHEMA;
use crate::error::{TrackingError, TrackingResult};
use crate::primary_key::PrimaryKeyValue;
use crate::record::{Record, RecordSnapshot, Row, TableMetadata};
use crate::session::SessionBackend;
use crate::transaction::TransactionResource;

type TableRows = IndexMap<PrimaryKeyValue, Row>;

/// Session backend holding all tables in memory.
#[derive(Debug)]
pub struct MemoryBackend {
    default_schema: String,
    /// Map of table key to committed rows
    tables: HashMap<String, TableRows>,
    /// Staged copy of all tables while a transaction is open
    staging: Option<HashMap<String, TableRows>>,
    commits: usize,
    rollbacks: usize,
}

impl MemoryBackend {
    /// Creates an empty backend using the default schema for table keys.
    pub fn new() -> Self {
        Self::with_default_schema(DEFAULT_SCHEMA)
    }

    /// Creates an empty backend with a custom default schema.
    pub fn with_default_schema(default_schema: impl Into<String>) -> Self {
        Self {
            default_schema: default_schema.into(),
            tables: HashMap::new(),
            staging: None,
            commits: 0,
            rollbacks: 0,
        }
    }

    /// Stores a row outside of any transaction, replacing an existing one.
    pub fn seed<R: Record + ?Sized>(&mut self, record: &R) -> TrackingResult<()> {
        let row = Row::from(&record.snapshot()?);
        let table_key = row.metadata().table_key(&self.default_schema);
        self.tables
            .entry(table_key)
            .or_default()
            .insert(row.primary_key(), row);
        Ok(())
    }

    /// Returns a row as currently visible (staged view inside a transaction).
    pub fn get(&self, metadata: &TableMetadata, key: &PrimaryKeyValue) -> Option<&Row> {
        self.rows()
            .get(&metadata.table_key(&self.default_schema))
            .and_then(|rows| rows.get(key))
    }

    /// Returns the number of committed rows in a table.
    pub fn committed_len(&self, table_key: &str) -> usize {
        self.tables.get(table_key).map_or(0, IndexMap::len)
    }

    /// Returns whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.staging.is_some()
    }

    /// Returns the number of successful commits.
    pub fn commits(&self) -> usize {
        self.commits
    }

    /// Returns the number of rollbacks.
    pub fn rollbacks(&self) -> usize {
        self.rollbacks
    }

    fn rows(&self) -> &HashMap<String, TableRows> {
        self.staging.as_ref().unwrap_or(&self.tables)
    }

    fn rows_mut(&mut self) -> &mut HashMap<String, TableRows> {
        match &mut self.staging {
            Some(staging) => staging,
            None => &mut self.tables,
        }
    }

    fn table_mut(&mut self, metadata: &TableMetadata) -> &mut TableRows {
        let table_key = metadata.table_key(&self.default_schema);
        self.rows_mut().entry(table_key).or_default()
    }

    fn not_found(&self, metadata: &TableMetadata, key: &PrimaryKeyValue) -> TrackingError {
        TrackingError::RecordNotFound {
            table: metadata.table_key(&self.default_schema),
            key: key.to_string(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionResource for MemoryBackend {
    fn open(&mut self) -> TrackingResult<()> {
        if self.staging.is_some() {
            return Err(TrackingError::Backend("transaction already open".to_string()));
        }
        self.staging = Some(self.tables.clone());
        Ok(())
    }

    fn commit(&mut self) -> TrackingResult<()> {
        let staging = self
            .staging
            .take()
            .ok_or_else(|| TrackingError::Backend("no open transaction to commit".to_string()))?;
        self.tables = staging;
        self.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> TrackingResult<()> {
        self.staging = None;
        self.rollbacks += 1;
        Ok(())
    }

    fn close(&mut self) -> TrackingResult<()> {
        if self.staging.take().is_some() {
            tracing::warn!("Transaction closed without commit or rollback, staged rows discarded");
        }
        Ok(())
    }
}

impl SessionBackend for MemoryBackend {
    fn fetch(
        &mut self,
        metadata: &Arc<TableMetadata>,
        key: &PrimaryKeyValue,
    ) -> TrackingResult<Option<Row>> {
        Ok(self.get(metadata, key).cloned())
    }

    fn insert(&mut self, record: &RecordSnapshot) -> TrackingResult<()> {
        let key = record.primary_key();
        if self.get(record.metadata(), &key).is_some() {
            return Err(TrackingError::DuplicateKey {
                table: record.metadata().table_key(&self.default_schema),
                key: key.to_string(),
            });
        }
        self.table_mut(record.metadata()).insert(key, Row::from(record));
        Ok(())
    }

    fn update(&mut self, record: &RecordSnapshot) -> TrackingResult<()> {
        let key = record.primary_key();
        if self.get(record.metadata(), &key).is_none() {
            return Err(self.not_found(record.metadata(), &key));
        }
        self.table_mut(record.metadata()).insert(key, Row::from(record));
        Ok(())
    }

    fn delete(&mut self, metadata: &TableMetadata, key: &PrimaryKeyValue) -> TrackingResult<()> {
        if self.table_mut(metadata).shift_remove(key).is_none() {
            return Err(self.not_found(metadata, key));
        }
        Ok(())
    }
}
