//! Error and Result types.

use std::error::Error as StdError;
use std::fmt::{Debug, Display};

/// A specialized `Result` type for sturdy.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A generic error that represents all the ways a method can fail inside the engine.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A connection string or an engine option was malformed.
    #[error("configuration error: {0}")]
    Configuration(Box<str>),

    /// No rows were matched by an operation that targets a specific row.
    #[error("no row found for the targeted key")]
    NotFound,

    /// A version-guarded update matched no row: the row was modified (or removed)
    /// by another writer since it was read.
    #[error("row was changed by a concurrent writer since it was read")]
    OptimisticConcurrency,

    /// The expression translator encountered a construct it cannot render as SQL.
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(Box<str>),

    /// Row mapping failed: a column value could not be converted to the requested type.
    #[error("type mismatch: {0}")]
    TypeMismatch(Box<str>),

    /// The database reported a foreign key constraint violation.
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(Box<dyn DatabaseError>),

    /// The database reported a unique constraint violation.
    #[error("unique violation: {0}")]
    UniqueViolation(Box<dyn DatabaseError>),

    /// [Pool::acquire][crate::pool::Pool::acquire] timed out before a connection
    /// became available.
    #[error("timed out while waiting for an open connection")]
    PoolTimeout,

    /// The pool was closed while waiting in [Pool::acquire][crate::pool::Pool::acquire].
    #[error("attempted to acquire a connection on a closed pool")]
    PoolClosed,

    /// API misuse, e.g. an operation on a completed transaction.
    #[error("invalid state: {0}")]
    InvalidState(Box<str>),

    /// Connection-level or I/O failure reported by the driver.
    #[error("transport error: {0}")]
    Transport(Box<dyn DatabaseError>),

    /// [validate_table][crate::repository::Repository::validate_table] found a
    /// structural divergence that makes the table unusable.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(Box<str>),

    /// Any other error returned by the database.
    #[error("database error: {0}")]
    Database(Box<dyn DatabaseError>),

    /// Unexpected or invalid data on the driver boundary; generally indicates a
    /// bug in a backend or a corrupted connection.
    #[error("protocol error: {0}")]
    Protocol(Box<str>),
}

impl Error {
    pub(crate) fn config(message: impl Display) -> Self {
        Error::Configuration(message.to_string().into_boxed_str())
    }

    pub(crate) fn unsupported(message: impl Display) -> Self {
        Error::UnsupportedExpression(message.to_string().into_boxed_str())
    }

    pub(crate) fn type_mismatch(message: impl Display) -> Self {
        Error::TypeMismatch(message.to_string().into_boxed_str())
    }

    pub(crate) fn invalid_state(message: impl Display) -> Self {
        Error::InvalidState(message.to_string().into_boxed_str())
    }

    pub(crate) fn protocol(message: impl Display) -> Self {
        Error::Protocol(message.to_string().into_boxed_str())
    }

    /// Whether this error indicates that the physical connection is broken and
    /// must not be returned to the pool.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// The database-reported error, if this error carries one.
    pub fn as_database_error(&self) -> Option<&dyn DatabaseError> {
        match self {
            Error::ForeignKeyViolation(e)
            | Error::UniqueViolation(e)
            | Error::Transport(e)
            | Error::Database(e) => Some(&**e),
            _ => None,
        }
    }
}

/// An error that was returned by the database.
pub trait DatabaseError: 'static + StdError + Send + Sync {
    /// The primary, human-readable error message.
    fn message(&self) -> &str;

    /// The driver-specific error code, if any.
    fn code(&self) -> Option<&str> {
        None
    }

    /// The name of the violated constraint, when the database reports one.
    fn constraint(&self) -> Option<&str> {
        None
    }
}
