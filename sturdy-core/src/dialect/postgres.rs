use std::fmt::Write;

use super::{escape_literal, quote_double, Dialect, IsolationLevel, KeyRecovery, UpsertForm};
use crate::meta::ColumnMeta;
use crate::types::{EnumRepr, LogicalType};

/// The PostgreSQL dialect (translation target).
#[derive(Debug, Clone, Copy, Default)]
pub struct Postgres;

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_into(&self, ident: &str, out: &mut String) {
        quote_double(ident, out);
    }

    fn placeholder(&self, index: usize, out: &mut String) {
        let _ = write!(out, "${index}");
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>, out: &mut String) {
        if let Some(limit) = limit {
            let _ = write!(out, " LIMIT {limit}");
        }
        if let Some(offset) = offset {
            let _ = write!(out, " OFFSET {offset}");
        }
    }

    fn max_bind_params(&self) -> usize {
        65_535
    }

    fn key_recovery(&self) -> KeyRecovery {
        KeyRecovery::Returning
    }

    fn upsert_form(&self) -> UpsertForm {
        UpsertForm::OnConflict
    }

    fn column_type(&self, ty: &LogicalType) -> String {
        match ty {
            LogicalType::Bool => "BOOLEAN".into(),
            LogicalType::Short => "SMALLINT".into(),
            LogicalType::Int => "INTEGER".into(),
            LogicalType::Long | LogicalType::Interval => "BIGINT".into(),
            LogicalType::Double => "DOUBLE PRECISION".into(),
            LogicalType::Decimal { precision, scale } => {
                format!("NUMERIC({precision},{scale})")
            }
            LogicalType::Text { max_len: Some(n) } => format!("VARCHAR({n})"),
            LogicalType::Text { max_len: None } => "TEXT".into(),
            LogicalType::Bytes => "BYTEA".into(),
            LogicalType::DateTime => "TIMESTAMP".into(),
            LogicalType::DateTimeOffset => "TIMESTAMPTZ".into(),
            LogicalType::Guid => "UUID".into(),
            LogicalType::Enum(EnumRepr::Int) => "INTEGER".into(),
            LogicalType::Enum(EnumRepr::Text) => "VARCHAR(64)".into(),
        }
    }

    fn column_ddl(&self, column: &ColumnMeta, out: &mut String) {
        if column.auto_increment {
            // serial columns subsume the type and the generator
            self.quote_into(&column.name, out);
            out.push_str(" BIGSERIAL");
            if column.primary_key {
                out.push_str(" PRIMARY KEY");
            }
            return;
        }

        self.quote_into(&column.name, out);
        out.push(' ');
        out.push_str(&self.column_type(&column.ty));
        if column.primary_key {
            out.push_str(" PRIMARY KEY");
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

    fn auto_increment_keyword(&self) -> &'static str {
        // unused: auto-increment columns render as BIGSERIAL in column_ddl
        ""
    }

    fn begin_statements(&self, level: Option<IsolationLevel>) -> Vec<String> {
        match level {
            Some(level) => vec![format!("BEGIN ISOLATION LEVEL {}", level.as_sql())],
            None => vec!["BEGIN".into()],
        }
    }

    fn describe_columns_sql(&self, table: &str) -> String {
        format!(
            "SELECT c.column_name AS \"name\", c.data_type AS \"type\", \
             CASE WHEN c.is_nullable = 'NO' THEN 1 ELSE 0 END AS \"notnull\", \
             CASE WHEN tc.constraint_type = 'PRIMARY KEY' THEN 1 ELSE 0 END AS \"pk\" \
             FROM information_schema.columns c \
             LEFT JOIN information_schema.key_column_usage kcu \
               ON kcu.table_name = c.table_name AND kcu.column_name = c.column_name \
             LEFT JOIN information_schema.table_constraints tc \
               ON tc.constraint_name = kcu.constraint_name AND tc.constraint_type = 'PRIMARY KEY' \
             WHERE c.table_name = '{}' ORDER BY c.ordinal_position",
            escape_literal(table)
        )
    }

    fn list_indexes_sql(&self, table: &str) -> String {
        format!(
            "SELECT i.relname AS \"name\", CASE WHEN ix.indisunique THEN 1 ELSE 0 END AS \"unique\" \
             FROM pg_class t \
             JOIN pg_index ix ON t.oid = ix.indrelid \
             JOIN pg_class i ON i.oid = ix.indexrelid \
             WHERE t.relname = '{}' AND NOT ix.indisprimary",
            escape_literal(table)
        )
    }

    fn index_columns_sql(&self, table: &str, index: &str) -> String {
        format!(
            "SELECT a.attname AS \"name\" \
             FROM pg_class t \
             JOIN pg_index ix ON t.oid = ix.indrelid \
             JOIN pg_class i ON i.oid = ix.indexrelid \
             JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey) \
             WHERE t.relname = '{}' AND i.relname = '{}'",
            escape_literal(table),
            escape_literal(index)
        )
    }

    fn drop_index_sql(&self, _table: &str, index: &str) -> String {
        let mut sql = String::from("DROP INDEX ");
        self.quote_into(index, &mut sql);
        sql
    }
}
