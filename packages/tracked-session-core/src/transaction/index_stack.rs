use crate::change_log::ChangeLog;
use crate::error::{TrackingError, TrackingResult};

/// What the physical transaction has to do after a scope transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelTransition {
    /// An inner scope began or ended; nothing to do
    Nested,
    /// The outermost scope began; open the transaction
    Opened,
    /// The outermost scope completed; commit and close
    Committed {
        /// Log length when the outermost scope began
        mark: usize,
    },
    /// The outermost scope ended cancelled; roll back and close
    RolledBack,
}

/// Per-level log lengths for nested transaction scopes.
///
/// `cancelled` is shared by every level: once any scope aborts, each
/// enclosing `complete` also discards the entries of its own scope, until
/// the next outermost `begin`.
#[derive(Debug, Default)]
pub struct TransactionIndexStack {
    marks: Vec<usize>,
    cancelled: bool,
}

impl TransactionIndexStack {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of open scopes.
    pub fn depth(&self) -> usize {
        self.marks.len()
    }

    /// Returns whether a scope is open.
    pub fn is_active(&self) -> bool {
        !self.marks.is_empty()
    }

    /// Returns whether an abort happened since the outermost `begin`.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Opens a scope at the current end of the log.
    pub fn begin(&mut self, log: &ChangeLog) -> LevelTransition {
        self.marks.push(log.len());
        if self.marks.len() == 1 {
            self.cancelled = false;
            tracing::debug!("Transaction begun at log length {}", log.len());
            LevelTransition::Opened
        } else {
            tracing::debug!("Nested transaction begun at depth {}", self.marks.len());
            LevelTransition::Nested
        }
    }

    /// Aborts the innermost scope, discarding its log entries.
    ///
    /// # Returns
    /// `TrackingResult<LevelTransition>`, failing with `NoActiveTransaction`
    /// at depth 0.
    pub fn abort(&mut self, log: &mut ChangeLog) -> TrackingResult<LevelTransition> {
        let mark = self.marks.pop().ok_or(TrackingError::NoActiveTransaction)?;
        self.cancelled = true;
        let removed = log.truncate(mark);
        tracing::debug!(
            "Transaction aborted at depth {}, discarded {} log entries",
            self.marks.len() + 1,
            removed
        );

        if self.marks.is_empty() {
            Ok(LevelTransition::RolledBack)
        } else {
            Ok(LevelTransition::Nested)
        }
    }

    /// Completes the innermost scope.
    ///
    /// When a scope was aborted earlier, the completed scope's entries are
    /// discarded as well.
    ///
    /// # Returns
    /// `TrackingResult<LevelTransition>`, failing with `NoActiveTransaction`
    /// at depth 0.
    pub fn complete(&mut self, log: &mut ChangeLog) -> TrackingResult<LevelTransition> {
        let mark = self.marks.pop().ok_or(TrackingError::NoActiveTransaction)?;
        if self.cancelled {
            let removed = log.truncate(mark);
            tracing::debug!(
                "Cancelled transaction completed at depth {}, discarded {} log entries",
                self.marks.len() + 1,
                removed
            );
        }

        if !self.marks.is_empty() {
            Ok(LevelTransition::Nested)
        } else if self.cancelled {
            Ok(LevelTransition::RolledBack)
        } else {
            tracing::debug!("Transaction completed at log length {}", log.len());
            Ok(LevelTransition::Committed { mark })
        }
    }

    /// Aborts the outermost scope and everything nested in it.
    ///
    /// # Returns
    /// `true` if a scope was open, in which case the physical transaction
    /// has to be rolled back.
    pub fn abort_all(&mut self, log: &mut ChangeLog) -> bool {
        let Some(&outermost) = self.marks.first() else {
            return false;
        };
        let removed = log.truncate(outermost);
        tracing::debug!(
            "Implicit abort of {} open transaction levels, discarded {} log entries",
            self.marks.len(),
            removed
        );
        self.marks.clear();
        self.cancelled = true;
        true
    }

    /// Drops every open scope without touching the log.
    pub fn clear(&mut self) {
        self.marks.clear();
        self.cancelled = false;
    }
}
