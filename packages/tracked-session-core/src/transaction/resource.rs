use crate::error::TrackingResult;

/// Physical transaction of the underlying database.
///
/// Driven only by outermost-level transitions: `open` when the first scope
/// begins, then `commit` or `rollback` followed by `close` when the last
/// scope ends.
pub trait TransactionResource {
    /// Opens a transaction.
    fn open(&mut self) -> TrackingResult<()>;

    /// Commits the open transaction.
    fn commit(&mut self) -> TrackingResult<()>;

    /// Rolls back the open transaction.
    fn rollback(&mut self) -> TrackingResult<()>;

    /// Releases the transaction after commit or rollback.
    fn close(&mut self) -> TrackingResult<()>;
}
