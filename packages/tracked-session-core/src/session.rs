//! Tracked data-access session.
//!
//! A `TrackedSession` performs record operations through a `SessionBackend`,
//! logs every successful operation when tracking is enabled, and hands the
//! consolidated `DatabaseChangeSet` to a completion callback when closed.

use std::sync::Arc;

use crate::change_log::{ChangeLog, OperationKind};
use crate::change_set::DatabaseChangeSet;
use crate::config::SessionConfig;
use crate::consolidator::Consolidator;
use crate::error::{BoxError, TrackingError, TrackingResult};
use crate::primary_key::PrimaryKeyValue;
use crate::record::{Record, RecordSnapshot, Row, TableMetadata};
use crate::transaction::{LevelTransition, TransactionIndexStack, TransactionResource};

/// Callback receiving the finished change set at session teardown.
pub type CompletionCallback = Box<dyn FnOnce(&DatabaseChangeSet) -> Result<(), BoxError>>;

/// Storage collaborator of a tracked session.
pub trait SessionBackend: TransactionResource {
    /// Reads a record by primary key.
    fn fetch(
        &mut self,
        metadata: &Arc<TableMetadata>,
        key: &PrimaryKeyValue,
    ) -> TrackingResult<Option<Row>>;

    /// Stores a new record.
    fn insert(&mut self, record: &RecordSnapshot) -> TrackingResult<()>;

    /// Overwrites a stored record.
    fn update(&mut self, record: &RecordSnapshot) -> TrackingResult<()>;

    /// Removes a stored record.
    fn delete(&mut self, metadata: &TableMetadata, key: &PrimaryKeyValue) -> TrackingResult<()>;
}

/// Data-access session with optional change tracking.
///
/// Not thread-safe; a session is owned and driven by one caller. Dropping
/// a session without calling `close` runs the same teardown and logs any
/// failure.
pub struct TrackedSession<B: SessionBackend> {
    backend: B,
    config: SessionConfig,
    log: ChangeLog,
    transactions: TransactionIndexStack,
    on_complete: Option<CompletionCallback>,
    closed: bool,
}

impl<B: SessionBackend> TrackedSession<B> {
    /// Creates a session over `backend`.
    pub fn new(backend: B, config: SessionConfig) -> Self {
        Self {
            backend,
            log: ChangeLog::new(config.track_changes),
            config,
            transactions: TransactionIndexStack::new(),
            on_complete: None,
            closed: false,
        }
    }

    /// Sets the callback that receives the change set at teardown.
    #[must_use]
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&DatabaseChangeSet) -> Result<(), BoxError> + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Returns whether operations are being recorded.
    pub fn is_tracking(&self) -> bool {
        self.log.is_enabled()
    }

    /// Returns the change log recorded so far.
    pub fn log(&self) -> &ChangeLog {
        &self.log
    }

    /// Returns the current transaction nesting depth.
    pub fn transaction_depth(&self) -> usize {
        self.transactions.depth()
    }

    /// Returns the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the backend mutably.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Records that `record` was read and is now observed.
    pub fn record_attach<R: Record + ?Sized>(&mut self, record: &R) -> TrackingResult<()> {
        self.log.record(record, OperationKind::Attached)
    }

    /// Records that `record` was inserted.
    pub fn record_insert<R: Record + ?Sized>(&mut self, record: &R) -> TrackingResult<()> {
        self.log.record(record, OperationKind::Inserted)
    }

    /// Records that `record` was updated.
    pub fn record_update<R: Record + ?Sized>(&mut self, record: &R) -> TrackingResult<()> {
        self.log.record(record, OperationKind::Updated)
    }

    /// Records that `record` was deleted.
    pub fn record_delete<R: Record + ?Sized>(&mut self, record: &R) -> TrackingResult<()> {
        self.log.record(record, OperationKind::Deleted)
    }

    /// Begins a transaction scope, opening the physical transaction at the
    /// outermost level.
    pub fn begin_transaction(&mut self) -> TrackingResult<()> {
        if !self.transactions.is_active() {
            self.backend.open()?;
        }
        self.transactions.begin(&self.log);
        Ok(())
    }

    /// Aborts the innermost transaction scope.
    ///
    /// # Returns
    /// `TrackingResult<()>`, failing with `NoActiveTransaction` when no scope
    /// is open.
    pub fn abort_transaction(&mut self) -> TrackingResult<()> {
        let transition = self.transactions.abort(&mut self.log)?;
        self.finish(transition)
    }

    /// Completes the innermost transaction scope.
    ///
    /// # Returns
    /// `TrackingResult<()>`, failing with `NoActiveTransaction` when no scope
    /// is open.
    pub fn complete_transaction(&mut self) -> TrackingResult<()> {
        let transition = self.transactions.complete(&mut self.log)?;
        self.finish(transition)
    }

    fn finish(&mut self, transition: LevelTransition) -> TrackingResult<()> {
        match transition {
            LevelTransition::Nested | LevelTransition::Opened => Ok(()),
            LevelTransition::RolledBack => self.release(),
            LevelTransition::Committed { mark } => {
                if let Err(e) = self.backend.commit() {
                    let removed = self.log.truncate(mark);
                    tracing::error!("Commit failed, discarded {} log entries: {}", removed, e);
                    if let Err(close) = self.backend.close() {
                        tracing::warn!("Close after failed commit failed: {}", close);
                    }
                    return Err(e);
                }
                self.backend.close()
            }
        }
    }

    /// Rolls back the physical transaction and closes it. The backend is
    /// closed even when rollback fails; the first error is returned.
    fn release(&mut self) -> TrackingResult<()> {
        let rollback = self.backend.rollback();
        let close = self.backend.close();
        if let (Err(_), Err(e)) = (&rollback, &close) {
            tracing::warn!("Close after failed rollback failed: {}", e);
        }
        rollback.and(close)
    }

    /// Reads a record and attaches it when found.
    pub fn fetch(
        &mut self,
        metadata: &Arc<TableMetadata>,
        key: &PrimaryKeyValue,
    ) -> TrackingResult<Option<Row>> {
        let row = self.backend.fetch(metadata, key)?;
        if let Some(row) = &row {
            self.log.record(row, OperationKind::Attached)?;
        }
        Ok(row)
    }

    /// Inserts a record.
    pub fn insert<R: Record + ?Sized>(&mut self, record: &R) -> TrackingResult<()> {
        let snapshot = record.snapshot()?;
        self.backend.insert(&snapshot)?;
        self.log.record_snapshot(snapshot, OperationKind::Inserted);
        Ok(())
    }

    /// Updates a record.
    pub fn update<R: Record + ?Sized>(&mut self, record: &R) -> TrackingResult<()> {
        let snapshot = record.snapshot()?;
        self.backend.update(&snapshot)?;
        self.log.record_snapshot(snapshot, OperationKind::Updated);
        Ok(())
    }

    /// Deletes a record. The caller's values are logged as the deleted state.
    pub fn delete<R: Record + ?Sized>(&mut self, record: &R) -> TrackingResult<()> {
        let snapshot = record.snapshot()?;
        self.backend.delete(snapshot.metadata(), &snapshot.primary_key())?;
        self.log.record_snapshot(snapshot, OperationKind::Deleted);
        Ok(())
    }

    /// Deletes a record by primary key.
    ///
    /// The stored record is read back first so the log holds its values;
    /// the read itself is not attached.
    pub fn delete_by_id(
        &mut self,
        metadata: &Arc<TableMetadata>,
        key: &PrimaryKeyValue,
    ) -> TrackingResult<()> {
        let row = self
            .backend
            .fetch(metadata, key)?
            .ok_or_else(|| TrackingError::RecordNotFound {
                table: metadata.table_key(&self.config.default_schema),
                key: key.to_string(),
            })?;
        self.backend.delete(metadata, key)?;
        self.log.record(&row, OperationKind::Deleted)
    }

    /// Ends the session.
    ///
    /// Open transaction scopes are aborted. With tracking enabled the log is
    /// consolidated and the change set is passed to the completion callback.
    ///
    /// # Returns
    /// `TrackingResult<()>`, failing with `TrackingAborted` when the callback
    /// reports an error.
    pub fn close(mut self) -> TrackingResult<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> TrackingResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut rollback = Ok(());
        if self.transactions.abort_all(&mut self.log) {
            rollback = self.release();
            if let Err(e) = &rollback {
                tracing::error!("Rollback of open transaction at teardown failed: {}", e);
            }
        }

        let changes = if self.log.is_enabled() {
            let consolidator = Consolidator::new(self.config.default_schema.as_str());
            Some(consolidator.consolidate(self.log.entries()))
        } else {
            None
        };

        self.transactions.clear();
        self.log.clear();

        if let (Some(changes), Some(callback)) = (changes, self.on_complete.take()) {
            if let Err(source) = callback(&changes) {
                return Err(TrackingError::TrackingAborted {
                    changes: Box::new(changes),
                    source,
                });
            }
        }

        rollback
    }
}

impl<B: SessionBackend> Drop for TrackedSession<B> {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            tracing::error!("Tracked session teardown failed: {}", e);
        }
    }
}
