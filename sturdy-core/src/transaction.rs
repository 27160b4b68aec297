//! Transactions: a borrowed connection plus a database-level transaction.

use crate::dialect::{Dialect, IsolationLevel};
use crate::error::{Error, Result};
use crate::pool::{Pool, PoolConnection};

/// A scoped multi-statement unit of work bound to one pooled connection.
///
/// Repository operations participate by taking the handle as an explicit
/// parameter (`*_in` methods); they then run on this connection, in call
/// order. The handle is the serialization point: it is `Send` but not `Sync`,
/// so it cannot be shared across tasks.
///
/// A handle dropped while still active queues a `ROLLBACK` on its connection
/// and releases the connection to the pool.
pub struct Transaction {
    conn: Option<PoolConnection>,
    open: bool,
    dialect: &'static dyn Dialect,
}

impl Transaction {
    pub(crate) async fn begin_on(pool: &Pool, level: Option<IsolationLevel>) -> Result<Self> {
        let mut conn = pool.acquire().await?;

        for statement in pool.dialect().begin_statements(level) {
            conn.execute(&statement, Vec::new()).await?;
        }

        Ok(Transaction {
            conn: Some(conn),
            open: true,
            dialect: pool.dialect(),
        })
    }

    /// Nested transactions are not supported; this always fails with
    /// [`InvalidState`][Error::InvalidState].
    pub fn begin(&mut self) -> Result<Transaction> {
        Err(Error::invalid_state(
            "nested transactions are not supported",
        ))
    }

    /// Make every change of this transaction durable and release the
    /// connection.
    pub async fn commit(mut self) -> Result<()> {
        let statement = self.dialect.commit_statement();
        self.connection()?.execute(statement, Vec::new()).await?;
        self.open = false;
        Ok(())
    }

    /// Discard every change of this transaction and release the connection.
    pub async fn rollback(mut self) -> Result<()> {
        let statement = self.dialect.rollback_statement();
        self.connection()?.execute(statement, Vec::new()).await?;
        self.open = false;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The pinned connection; fails once the transaction completed.
    pub(crate) fn connection(&mut self) -> Result<&mut PoolConnection> {
        if !self.open {
            return Err(Error::invalid_state(
                "operation on a completed transaction",
            ));
        }
        Ok(self
            .conn
            .as_mut()
            .expect("(bug) transaction connection already released"))
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.open {
            if let Some(conn) = self.conn.as_mut() {
                log::debug!("transaction dropped while active; rolling back");
                conn.raw().rollback_unawaited();
            }
        }
        // the connection field drops next and releases to the pool
    }
}
