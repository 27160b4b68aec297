//! The seam between the engine and a database driver.

use futures_core::future::BoxFuture;
use futures_core::stream::BoxStream;

use crate::dialect::Dialect;
use crate::error::Result;
use crate::row::Row;
use crate::types::Value;

/// The outcome of a statement that does not return rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteResult {
    pub rows_affected: u64,
    /// The generated key of the last inserted row, for dialects recovering
    /// keys via [`KeyRecovery::LastInsertId`][crate::dialect::KeyRecovery].
    pub last_insert_id: Option<i64>,
}

/// A single physical database connection.
///
/// Implementations are owned by the pool and driven by exactly one task at a
/// time. Dropping a connection closes it; there is no async teardown on this
/// seam.
pub trait RawConnection: Send + std::fmt::Debug + 'static {
    /// Run a statement, discarding any rows it may produce.
    fn execute<'c>(
        &'c mut self,
        sql: &'c str,
        params: Vec<Value>,
    ) -> BoxFuture<'c, Result<ExecuteResult>>;

    /// Run a query and materialize every row.
    fn fetch_all<'c>(
        &'c mut self,
        sql: &'c str,
        params: Vec<Value>,
    ) -> BoxFuture<'c, Result<Vec<Row>>>;

    /// Run a query and stream rows as the driver produces them.
    fn fetch_stream<'c>(
        &'c mut self,
        sql: &'c str,
        params: Vec<Value>,
    ) -> BoxStream<'c, Result<Row>>;

    /// Fast liveness check used by the pool before handing a connection out.
    fn ping(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Queue a `ROLLBACK` without waiting for its outcome.
    ///
    /// Called when a [`Transaction`][crate::transaction::Transaction] is
    /// dropped while still active; the statement must run before any later
    /// command issued on this connection.
    fn rollback_unawaited(&mut self);
}

/// A database backend: a dialect plus a way to open connections.
pub trait Backend: Send + Sync + std::fmt::Debug + 'static {
    fn dialect(&self) -> &'static dyn Dialect;

    fn connect(&self) -> BoxFuture<'static, Result<Box<dyn RawConnection>>>;
}
