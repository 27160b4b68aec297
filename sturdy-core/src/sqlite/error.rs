//! Mapping of SQLite failures onto the engine's error taxonomy.

use std::fmt;

use rusqlite::ffi;
use rusqlite::ErrorCode;

use crate::error::{DatabaseError, Error};

/// A failure reported by SQLite itself.
pub struct SqliteError {
    message: String,
    code: Option<String>,
}

impl SqliteError {
    fn new(message: String, extended_code: Option<i32>) -> Self {
        SqliteError {
            message,
            code: extended_code.map(|c| c.to_string()),
        }
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        SqliteError {
            message: message.into(),
            code: None,
        }
    }
}

impl fmt::Display for SqliteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.message)
    }
}

impl fmt::Debug for SqliteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteError")
            .field("message", &self.message)
            .field("code", &self.code)
            .finish()
    }
}

impl std::error::Error for SqliteError {}

impl DatabaseError for SqliteError {
    fn message(&self) -> &str {
        &self.message
    }

    fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    fn constraint(&self) -> Option<&str> {
        // "UNIQUE constraint failed: authors.name"
        self.message
            .split_once("constraint failed: ")
            .map(|(_, name)| name)
    }
}

/// The error used when the worker thread is gone: the connection is dead.
pub(crate) fn worker_gone() -> Error {
    Error::Transport(Box::new(SqliteError::protocol(
        "sqlite worker thread has exited",
    )))
}

pub(crate) fn map_rusqlite_error(e: rusqlite::Error) -> Error {
    match e {
        rusqlite::Error::SqliteFailure(cause, message) => {
            let message =
                message.unwrap_or_else(|| cause.to_string());
            let boxed = Box::new(SqliteError::new(message, Some(cause.extended_code)));

            match cause.extended_code {
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Error::ForeignKeyViolation(boxed),
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    Error::UniqueViolation(boxed)
                }
                _ => match cause.code {
                    ErrorCode::CannotOpen
                    | ErrorCode::NotADatabase
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::DiskFull => Error::Transport(boxed),
                    _ => Error::Database(boxed),
                },
            }
        }

        other => Error::Protocol(other.to_string().into_boxed_str()),
    }
}
