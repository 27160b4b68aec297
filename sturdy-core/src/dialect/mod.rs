//! SQL dialects.
//!
//! The translator, mutation planner and schema manager are all parameterized
//! on [`Dialect`]; nothing above this module writes dialect-specific SQL text.
//! SQLite is the executed backend; the other dialects are translation targets.

use std::fmt;
use std::fmt::Write;

use crate::meta::ColumnMeta;
use crate::types::LogicalType;

mod mssql;
mod mysql;
mod postgres;
mod sqlite;

pub use mssql::Mssql;
pub use mysql::MySql;
pub use postgres::Postgres;
pub use sqlite::Sqlite;

/// Transaction isolation levels, mapped by each dialect onto its BEGIN form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub(crate) fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// How a dialect reports the generated key of an inserted row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRecovery {
    /// The driver exposes the last inserted row id on the connection.
    LastInsertId,
    /// Append a `RETURNING <pk>` clause and read the key from the result row.
    Returning,
    /// Inject an `OUTPUT INSERTED.<pk>` clause before `VALUES`.
    Output,
}

/// The native single-statement upsert form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertForm {
    /// `INSERT ... ON CONFLICT (<pk>) DO UPDATE SET c = excluded.c`
    OnConflict,
    /// `INSERT ... ON DUPLICATE KEY UPDATE c = VALUES(c)`
    OnDuplicateKey,
    /// `MERGE INTO ... WHEN MATCHED ... WHEN NOT MATCHED ...`
    Merge,
}

/// Everything the engine needs to know about a SQL dialect.
pub trait Dialect: Send + Sync + fmt::Debug + 'static {
    fn name(&self) -> &'static str;

    /// Append `ident`, quoted. Applied to every table, column and index
    /// reference the engine emits.
    fn quote_into(&self, ident: &str, out: &mut String);

    /// Append the placeholder for the `index`-th bind parameter (1-based).
    fn placeholder(&self, index: usize, out: &mut String);

    fn bool_literal(&self, value: bool) -> &'static str;

    /// Append the dialect's limit/offset clause, including the leading space.
    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>, out: &mut String);

    fn trim_function(&self) -> &'static str {
        "TRIM"
    }

    fn length_function(&self) -> &'static str {
        "LENGTH"
    }

    /// Hard cap on bind parameters per statement; bounds batch chunk sizes.
    fn max_bind_params(&self) -> usize;

    fn key_recovery(&self) -> KeyRecovery;

    fn upsert_form(&self) -> UpsertForm;

    /// The DDL type for a logical column type.
    fn column_type(&self, ty: &LogicalType) -> String;

    /// Append one column definition of a CREATE TABLE statement.
    fn column_ddl(&self, column: &ColumnMeta, out: &mut String) {
        self.quote_into(&column.name, out);
        out.push(' ');
        out.push_str(&self.column_type(&column.ty));
        if column.primary_key {
            out.push_str(" PRIMARY KEY");
        }
        if column.auto_increment {
            out.push(' ');
            out.push_str(self.auto_increment_keyword());
        }
        if !column.nullable && !column.primary_key {
            out.push_str(" NOT NULL");
        }
        if let Some(fk) = &column.references {
            out.push_str(" REFERENCES ");
            self.quote_into(&fk.table, out);
            out.push('(');
            self.quote_into(&fk.column, out);
            out.push(')');
        }
    }

    fn auto_increment_keyword(&self) -> &'static str;

    fn create_table_prefix(&self) -> &'static str {
        "CREATE TABLE IF NOT EXISTS "
    }

    fn supports_create_index_if_not_exists(&self) -> bool {
        true
    }

    /// The statements opening a transaction at the given isolation level.
    fn begin_statements(&self, level: Option<IsolationLevel>) -> Vec<String>;

    fn commit_statement(&self) -> &'static str {
        "COMMIT"
    }

    fn rollback_statement(&self) -> &'static str {
        "ROLLBACK"
    }

    /// A query returning one row per column of `table`, with columns
    /// `name`, `type`, `notnull` (0/1) and `pk` (0/1).
    fn describe_columns_sql(&self, table: &str) -> String;

    /// A query returning one row per secondary index of `table`, with columns
    /// `name` and `unique` (0/1).
    fn list_indexes_sql(&self, table: &str) -> String;

    /// A query returning the column names of `index`, ordered, column `name`.
    fn index_columns_sql(&self, table: &str, index: &str) -> String;

    fn drop_index_sql(&self, table: &str, index: &str) -> String;
}

/// Escape a string for inclusion in a SQL string literal.
///
/// Only used for identifiers flowing into catalog queries; user data always
/// travels as bind parameters.
pub(crate) fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

pub(crate) fn quote_double(ident: &str, out: &mut String) {
    out.push('"');
    for ch in ident.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
}

pub(crate) fn write_limit_offset_standard(
    limit: Option<u64>,
    offset: Option<u64>,
    no_limit_form: &str,
    out: &mut String,
) {
    match (limit, offset) {
        (None, None) => {}
        (Some(limit), None) => {
            let _ = write!(out, " LIMIT {limit}");
        }
        (Some(limit), Some(offset)) => {
            let _ = write!(out, " LIMIT {limit} OFFSET {offset}");
        }
        (None, Some(offset)) => {
            // these engines require a limit clause before OFFSET
            let _ = write!(out, " LIMIT {no_limit_form} OFFSET {offset}");
        }
    }
}
