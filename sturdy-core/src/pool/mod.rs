//! A bounded pool of database connections.
//!
//! Acquisition is FIFO-fair and deadline-bounded; every successful acquire is
//! paired with exactly one release because the only way to hold a connection
//! is the [`PoolConnection`] guard, which releases on drop on every exit path.

use std::fmt;
use std::sync::Arc;

use tokio::sync::OwnedSemaphorePermit;

use crate::connection::{Backend, ExecuteResult, RawConnection};
use crate::dialect::Dialect;
use crate::error::Result;
use crate::logger::QueryLogger;
use crate::row::Row;
use crate::types::Value;

mod inner;
mod options;

use self::inner::{LiveConn, PoolInner};
pub use self::options::PoolOptions;

/// A pool of database connections.
///
/// Cheap to clone; all clones share the same state.
pub struct Pool(Arc<PoolInner>);

impl Pool {
    pub(crate) async fn new(backend: Box<dyn Backend>, options: PoolOptions) -> Result<Self> {
        Ok(Pool(PoolInner::new(backend, options).await?))
    }

    /// Borrow a connection, waiting up to the configured acquire timeout.
    pub async fn acquire(&self) -> Result<PoolConnection> {
        self.0.acquire().await
    }

    /// Close the pool: wake all waiters with
    /// [`PoolClosed`][crate::error::Error::PoolClosed], destroy idle
    /// connections, and destroy in-use connections as they are released.
    pub async fn close(&self) {
        self.0.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    /// The number of live (idle plus in-use) connections.
    pub fn size(&self) -> u32 {
        self.0.size()
    }

    pub fn num_idle(&self) -> usize {
        self.0.num_idle()
    }

    pub fn options(&self) -> &PoolOptions {
        self.0.options()
    }

    pub fn dialect(&self) -> &'static dyn Dialect {
        self.0.backend().dialect()
    }
}

impl Clone for Pool {
    fn clone(&self) -> Self {
        Pool(Arc::clone(&self.0))
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("size", &self.size())
            .field("num_idle", &self.num_idle())
            .field("is_closed", &self.is_closed())
            .finish()
    }
}

/// A connection borrowed from the pool.
///
/// Statement helpers here are the engine's single execution path: they log,
/// and they mark the connection broken when a statement fails with a
/// transport error so that the drop-release destroys it instead of pooling it.
#[derive(Debug)]
pub struct PoolConnection {
    live: Option<LiveConn>,
    healthy: bool,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl PoolConnection {
    pub(crate) fn new(pool: Arc<PoolInner>, live: LiveConn, permit: OwnedSemaphorePermit) -> Self {
        PoolConnection {
            live: Some(live),
            healthy: true,
            pool,
            _permit: permit,
        }
    }

    /// The raw driver connection.
    pub(crate) fn raw(&mut self) -> &mut dyn RawConnection {
        &mut *self
            .live
            .as_mut()
            .expect("(bug) connection already released to pool")
            .raw
    }

    /// Flag this connection as broken; it will be destroyed on release.
    pub fn mark_unhealthy(&mut self) {
        self.healthy = false;
    }

    pub(crate) async fn execute(&mut self, sql: &str, params: Vec<Value>) -> Result<ExecuteResult> {
        let mut logger = QueryLogger::new(sql);
        let result = self.raw().execute(sql, params).await;
        match &result {
            Ok(done) => logger.affected(done.rows_affected),
            Err(e) if e.is_transport() => self.healthy = false,
            Err(_) => {}
        }
        result
    }

    pub(crate) async fn fetch_all(&mut self, sql: &str, params: Vec<Value>) -> Result<Vec<Row>> {
        let mut logger = QueryLogger::new(sql);
        let result = self.raw().fetch_all(sql, params).await;
        match &result {
            Ok(rows) => logger.returned(rows.len() as u64),
            Err(e) if e.is_transport() => self.healthy = false,
            Err(_) => {}
        }
        result
    }
}

impl Drop for PoolConnection {
    fn drop(&mut self) {
        if let Some(live) = self.live.take() {
            self.pool.release(live, self.healthy);
        }
    }
}
