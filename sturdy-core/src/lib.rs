//! Core of sturdy: typed, per-entity repositories over SQL databases.
//!
//! The engine introspects entity metadata to manage schema and indexes,
//! translates declarative expressions into parameterized SQL, dispatches
//! statements through a bounded connection pool with transaction support,
//! enforces optimistic concurrency through version columns, and materializes
//! result rows back into entities, optionally loading related entities.
//!
//! Not intended to be used directly; see the `sturdy` facade crate.

#[cfg(feature = "blocking")]
pub mod blocking;
pub mod dialect;
pub mod expr;

mod connection;
mod database;
mod error;
mod include;
mod logger;
mod meta;
mod mutation;
mod options;
mod pool;
mod query;
mod repository;
mod row;
mod schema;
#[cfg(feature = "sqlite")]
mod sqlite;
mod transaction;
mod types;

pub use connection::{Backend, ExecuteResult, RawConnection};
pub use database::Database;
pub use dialect::{Dialect, IsolationLevel};
pub use error::{DatabaseError, Error, Result};
pub use expr::{col, val, Expr, IntoExpr};
pub use meta::{
    downcast_children, ColumnMeta, Entity, EntityMeta, ForeignKey, IndexMeta, MetaBuilder,
    MetaRef, Navigation, Registry, VersionRole,
};
pub use options::ConnectOptions;
pub use pool::{Pool, PoolConnection, PoolOptions};
pub use query::Query;
pub use repository::{BatchOutcome, Repository};
pub use row::{Row, RowMeta};
pub use schema::{IndexInfo, SchemaReport};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteBackend, SqliteConnection};
pub use transaction::Transaction;
pub use types::{
    decode_enum, encode_enum, EnumCodec, EnumRepr, FromValue, IntoValue, LogicalType, Value,
};
