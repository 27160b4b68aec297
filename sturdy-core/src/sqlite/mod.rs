//! The SQLite backend.
//!
//! All SQLite I/O for one connection happens on a dedicated worker thread that
//! owns the database handle; the async side is a thin message-passing shim.
//! In-memory databases use a process-unique shared-cache URI so that every
//! pooled connection sees the same database, and the backend pins one keeper
//! handle so the database survives pool recycling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use futures_core::future::BoxFuture;

use crate::connection::{Backend, RawConnection};
use crate::dialect::{Dialect, Sqlite};
use crate::error::Result;

mod connection;
mod error;

pub use connection::SqliteConnection;
pub use error::SqliteError;

/// Opens SQLite connections for a single database, file-backed or in-memory.
#[derive(Debug)]
pub struct SqliteBackend {
    path: String,
    _keeper: Option<Mutex<rusqlite::Connection>>,
}

impl SqliteBackend {
    /// A file-backed database at `path`, created if missing.
    pub fn file(path: impl Into<String>) -> Result<Self> {
        Ok(SqliteBackend {
            path: path.into(),
            _keeper: None,
        })
    }

    /// A fresh private in-memory database.
    pub fn memory() -> Result<Self> {
        static NEXT: AtomicU64 = AtomicU64::new(0);

        let path = format!(
            "file:sturdy_mem_{}_{}?mode=memory&cache=shared",
            std::process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        );

        // an in-memory database vanishes with its last handle; keep one for
        // the lifetime of the backend so pool recycling cannot drop the data
        let keeper = connection::open(&path)?;

        Ok(SqliteBackend {
            path,
            _keeper: Some(Mutex::new(keeper)),
        })
    }
}

impl Backend for SqliteBackend {
    fn dialect(&self) -> &'static dyn Dialect {
        &Sqlite
    }

    fn connect(&self) -> BoxFuture<'static, Result<Box<dyn RawConnection>>> {
        let path = self.path.clone();
        Box::pin(async move {
            let conn = SqliteConnection::establish(path).await?;
            Ok(Box::new(conn) as Box<dyn RawConnection>)
        })
    }
}
