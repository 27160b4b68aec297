//! Engine-wide configuration.

use url::Url;

use crate::connection::Backend;
use crate::dialect::IsolationLevel;
use crate::error::{Error, Result};
use crate::pool::PoolOptions;

/// Configuration for [`Database::connect_with`][crate::Database::connect_with]:
/// a connection string, pool options and a default isolation level.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    url: String,
    pool: PoolOptions,
    isolation: Option<IsolationLevel>,
}

impl ConnectOptions {
    /// Recognized connection strings:
    ///
    /// * `sqlite::memory:` — a fresh in-memory database shared by the pool
    /// * `sqlite:path/to.db` / `sqlite://path/to.db` — a file-backed database
    pub fn new(url: impl Into<String>) -> Self {
        ConnectOptions {
            url: url.into(),
            pool: PoolOptions::default(),
            isolation: None,
        }
    }

    pub fn pool_options(mut self, pool: PoolOptions) -> Self {
        self.pool = pool;
        self
    }

    /// Isolation level applied to every transaction begun without an explicit
    /// level.
    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation = Some(level);
        self
    }

    pub(crate) fn pool(&self) -> &PoolOptions {
        &self.pool
    }

    pub(crate) fn isolation(&self) -> Option<IsolationLevel> {
        self.isolation
    }

    pub(crate) fn build_backend(&self) -> Result<Box<dyn Backend>> {
        let url = Url::parse(&self.url)
            .map_err(|e| Error::config(format!("malformed connection string: {e}")))?;

        match url.scheme() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let path = match url.host_str() {
                    Some(host) if !host.is_empty() => format!("{host}{}", url.path()),
                    _ => url.path().to_owned(),
                };

                let backend = if path.is_empty() || path == ":memory:" {
                    crate::sqlite::SqliteBackend::memory()?
                } else {
                    crate::sqlite::SqliteBackend::file(path)?
                };
                Ok(Box::new(backend))
            }

            other => Err(Error::config(format!(
                "unsupported database scheme `{other}`"
            ))),
        }
    }
}
