//! The engine handle: one pool, one entity registry.

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::dialect::IsolationLevel;
use crate::error::Result;
use crate::meta::{Entity, Registry};
use crate::options::ConnectOptions;
use crate::pool::Pool;
use crate::repository::Repository;
use crate::transaction::Transaction;

struct DatabaseInner {
    pool: Pool,
    registry: RwLock<Registry>,
    isolation: Option<IsolationLevel>,
}

/// A handle to one database: the connection pool plus the set of registered
/// entities. Cheap to clone; all clones share state.
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Connect with default options; see [`ConnectOptions::new`] for the
    /// recognized connection strings.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(ConnectOptions::new(url)).await
    }

    pub async fn connect_with(options: ConnectOptions) -> Result<Self> {
        let backend = options.build_backend()?;
        let pool = Pool::new(backend, options.pool().clone()).await?;

        Ok(Database {
            inner: Arc::new(DatabaseInner {
                pool,
                registry: RwLock::new(Registry::default()),
                isolation: options.isolation(),
            }),
        })
    }

    pub fn pool(&self) -> &Pool {
        &self.inner.pool
    }

    /// Register an entity (and everything reachable through its navigations),
    /// validating cross-entity constraints.
    pub fn register<E: Entity>(&self) -> Result<()> {
        self.inner.registry.write().unwrap().register(E::meta())
    }

    /// A typed repository for `E`; registers the entity on first use.
    pub fn repository<E: Entity>(&self) -> Result<Repository<E>> {
        self.register::<E>()?;
        Ok(Repository::new(self.clone()))
    }

    /// Begin a transaction at the configured default isolation level.
    pub async fn begin_transaction(&self) -> Result<Transaction> {
        Transaction::begin_on(self.pool(), self.inner.isolation).await
    }

    pub async fn begin_transaction_with(&self, level: IsolationLevel) -> Result<Transaction> {
        Transaction::begin_on(self.pool(), Some(level)).await
    }

    /// Close the pool; outstanding connections are destroyed as they release.
    pub async fn close(&self) {
        self.pool().close().await;
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Database {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("pool", self.pool())
            .finish_non_exhaustive()
    }
}
