//! Change tracking for relational data-access sessions.
//!
//! Records every fetch, insert, update and delete performed through a
//! session, prunes the log on nested transaction aborts, and consolidates
//! it at session end into a per-table, per-record, per-field change report.

pub mod change_log;
pub mod change_set;
pub mod config;
pub mod consolidator;
pub mod error;
pub mod memory;
pub mod primary_key;
pub mod record;
pub mod session;
pub mod transaction;
pub mod value;

pub use change_log::{ChangeLog, ChangeLogEntry, OperationKind};
pub use change_set::{DatabaseChangeSet, FieldChange, Issue, RecordChangeSet, TableChangeSet};
pub use config::SessionConfig;
pub use consolidator::Consolidator;
pub use error::{BoxError, TrackingError, TrackingResult};
pub use memory::MemoryBackend;
pub use primary_key::PrimaryKeyValue;
pub use record::{Record, RecordSnapshot, Row, TableMetadata};
pub use session::{CompletionCallback, SessionBackend, TrackedSession};
pub use value::Value;
