//! Tracking error types.

use thiserror::Error;

use crate::change_set::DatabaseChangeSet;

/// Boxed error reported by a completion callback.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by a tracked session.
///
/// Usage anomalies found while replaying the change log are never errors;
/// they are attached to the affected record as issues.
#[derive(Error, Debug)]
pub enum TrackingError {
    /// `abort_transaction` or `complete_transaction` called at depth 0
    #[error("No active transaction")]
    NoActiveTransaction,

    /// The completion callback failed at session teardown
    #[error("Change tracking aborted: {source}")]
    TrackingAborted {
        /// Change set that was handed to the callback
        changes: Box<DatabaseChangeSet>,
        /// Error reported by the callback
        #[source]
        source: BoxError,
    },

    /// Failure reported by the backend collaborator
    #[error("Backend error: {0}")]
    Backend(String),

    /// Record not found in the backend
    #[error("Record {key} not found in table '{table}'")]
    RecordNotFound { table: String, key: String },

    /// Record with the same primary key already stored
    #[error("Record {key} already exists in table '{table}'")]
    DuplicateKey { table: String, key: String },

    /// Malformed record or metadata rejected at construction
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl TrackingError {
    /// Returns the change set carried by a `TrackingAborted` error.
    pub fn change_set(&self) -> Option<&DatabaseChangeSet> {
        match self {
            TrackingError::TrackingAborted { changes, .. } => Some(changes),
            _ => None,
        }
    }
}

/// Result type for tracking operations.
pub type TrackingResult<T> = Result<T, TrackingError>;
