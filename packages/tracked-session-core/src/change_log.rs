//! Append-only log of tracked record operations.

use std::fmt;

use serde::Serialize;

use crate::error::TrackingResult;
use crate::record::{Record, RecordSnapshot};

/// Kind of tracked operation, and the resulting state of a record change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationKind {
    /// Record was read and is observed for later diffing
    Attached,
    /// Record was inserted
    Inserted,
    /// Record was updated
    Updated,
    /// Record was deleted
    Deleted,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Attached => "Attached",
            OperationKind::Inserted => "Inserted",
            OperationKind::Updated => "Updated",
            OperationKind::Deleted => "Deleted",
        };
        f.write_str(name)
    }
}

/// One logged operation: the record as it was, and what happened to it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeLogEntry {
    snapshot: RecordSnapshot,
    kind: OperationKind,
}

impl ChangeLogEntry {
    /// Creates a log entry.
    pub fn new(snapshot: RecordSnapshot, kind: OperationKind) -> Self {
        Self { snapshot, kind }
    }

    /// Returns the record snapshot.
    pub fn snapshot(&self) -> &RecordSnapshot {
        &self.snapshot
    }

    /// Returns the operation kind.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }
}

/// Chronological log of tracked operations for one session.
///
/// Entries are only ever appended or cut off from the tail.
#[derive(Debug, Default)]
pub struct ChangeLog {
    enabled: bool,
    entries: Vec<ChangeLogEntry>,
}

impl ChangeLog {
    /// Creates an empty log. A disabled log ignores every `record` call.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Vec::new(),
        }
    }

    /// Returns whether recording is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Appends a snapshot of the record's current values.
    ///
    /// # Returns
    /// `TrackingResult<()>`, failing when the record's values do not match its
    /// metadata. Nothing is appended in that case.
    pub fn record<R: Record + ?Sized>(
        &mut self,
        record: &R,
        kind: OperationKind,
    ) -> TrackingResult<()> {
        if self.enabled {
            self.entries.push(ChangeLogEntry::new(record.snapshot()?, kind));
        }
        Ok(())
    }

    /// Appends an already captured snapshot.
    pub fn record_snapshot(&mut self, snapshot: RecordSnapshot, kind: OperationKind) {
        if self.enabled {
            self.entries.push(ChangeLogEntry::new(snapshot, kind));
        }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns all entries in chronological order.
    pub fn entries(&self) -> &[ChangeLogEntry] {
        &self.entries
    }

    /// Cuts the log back to `len` entries.
    ///
    /// # Returns
    /// Number of entries discarded.
    pub fn truncate(&mut self, len: usize) -> usize {
        let removed = self.entries.len().saturating_sub(len);
        self.entries.truncate(len);
        removed
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
