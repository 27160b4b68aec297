//! sturdy: typed, per-entity repositories over SQL databases.
//!
//! The engine (a) introspects entity metadata to manage schema and indexes,
//! (b) translates predicate, projection and ordering expressions into
//! parameterized SQL, (c) dispatches statements through a pooled connection
//! layer with transaction support, (d) enforces optimistic concurrency via a
//! version column, and (e) materializes result rows back into entity
//! instances, optionally loading related entities (to-one, to-many,
//! many-to-many).
//!
//! ```rust,ignore
//! use sturdy::prelude::*;
//!
//! let db = Database::connect("sqlite::memory:").await?;
//! let people = db.repository::<Person>()?;
//! people.initialize_table().await?;
//!
//! let mut person = Person::new("John", "Doe", 30);
//! people.create(&mut person).await?;
//!
//! let seniors = people
//!     .query()
//!     .filter(col("Age").ge(65))
//!     .order_by(col("LastName"))
//!     .fetch_all()
//!     .await?;
//! ```

pub use sturdy_core::{
    col, decode_enum, downcast_children, encode_enum, val, Backend, BatchOutcome, ColumnMeta,
    ConnectOptions, Database, DatabaseError, Dialect, Entity, EntityMeta, EnumCodec, EnumRepr,
    Error, ExecuteResult, Expr, ForeignKey, FromValue, IndexInfo, IndexMeta, IntoExpr, IntoValue,
    IsolationLevel, LogicalType, MetaBuilder, MetaRef, Navigation, Pool, PoolConnection,
    PoolOptions, Query, RawConnection, Registry, Repository, Result, Row, RowMeta, SchemaReport,
    Transaction, Value, VersionRole,
};

pub use sturdy_core::{dialect, expr};

#[cfg(feature = "blocking")]
pub use sturdy_core::blocking;

#[cfg(feature = "sqlite")]
pub use sturdy_core::{SqliteBackend, SqliteConnection};

/// The commonly needed imports, in one place.
pub mod prelude {
    pub use super::{
        col, val, ColumnMeta, Database, Entity, EntityMeta, EnumCodec, EnumRepr, Error, Expr,
        IndexMeta, IntoValue, IsolationLevel, LogicalType, PoolOptions, Repository, Result, Row,
        Transaction, Value, VersionRole,
    };
}
