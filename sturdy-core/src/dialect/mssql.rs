use std::fmt::Write;

use super::{escape_literal, Dialect, IsolationLevel, KeyRecovery, UpsertForm};
use crate::types::{EnumRepr, LogicalType};

/// The SQL Server dialect (translation target).
#[derive(Debug, Clone, Copy, Default)]
pub struct Mssql;

impl Dialect for Mssql {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn quote_into(&self, ident: &str, out: &mut String) {
        out.push('[');
        for ch in ident.chars() {
            if ch == ']' {
                out.push(']');
            }
            out.push(ch);
        }
        out.push(']');
    }

    fn placeholder(&self, index: usize, out: &mut String) {
        let _ = write!(out, "@p{index}");
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>, out: &mut String) {
        // OFFSET/FETCH is the only paging form that composes with ORDER BY
        let offset = offset.unwrap_or(0);
        let _ = write!(out, " OFFSET {offset} ROWS");
        if let Some(limit) = limit {
            let _ = write!(out, " FETCH NEXT {limit} ROWS ONLY");
        }
    }

    fn length_function(&self) -> &'static str {
        "LEN"
    }

    fn max_bind_params(&self) -> usize {
        2_100
    }

    fn key_recovery(&self) -> KeyRecovery {
        KeyRecovery::Output
    }

    fn upsert_form(&self) -> UpsertForm {
        UpsertForm::Merge
    }

    fn column_type(&self, ty: &LogicalType) -> String {
        match ty {
            LogicalType::Bool => "BIT".into(),
            LogicalType::Short => "SMALLINT".into(),
            LogicalType::Int => "INT".into(),
            LogicalType::Long | LogicalType::Interval => "BIGINT".into(),
            LogicalType::Double => "FLOAT".into(),
            LogicalType::Decimal { precision, scale } => {
                format!("DECIMAL({precision},{scale})")
            }
            LogicalType::Text { max_len: Some(n) } => format!("NVARCHAR({n})"),
            LogicalType::Text { max_len: None } => "NVARCHAR(MAX)".into(),
            LogicalType::Bytes => "VARBINARY(MAX)".into(),
            LogicalType::DateTime => "DATETIME2".into(),
            LogicalType::DateTimeOffset => "DATETIMEOFFSET".into(),
            LogicalType::Guid => "UNIQUEIDENTIFIER".into(),
            LogicalType::Enum(EnumRepr::Int) => "INT".into(),
            LogicalType::Enum(EnumRepr::Text) => "NVARCHAR(64)".into(),
        }
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "IDENTITY(1,1)"
    }

    fn create_table_prefix(&self) -> &'static str {
        "CREATE TABLE "
    }

    fn supports_create_index_if_not_exists(&self) -> bool {
        false
    }

    fn begin_statements(&self, level: Option<IsolationLevel>) -> Vec<String> {
        let mut statements = Vec::new();
        if let Some(level) = level {
            statements.push(format!(
                "SET TRANSACTION ISOLATION LEVEL {}",
                level.as_sql()
            ));
        }
        statements.push("BEGIN TRANSACTION".into());
        statements
    }

    fn describe_columns_sql(&self, table: &str) -> String {
        format!(
            "SELECT c.COLUMN_NAME AS [name], c.DATA_TYPE AS [type], \
             CASE WHEN c.IS_NULLABLE = 'NO' THEN 1 ELSE 0 END AS [notnull], \
             CASE WHEN kcu.COLUMN_NAME IS NULL THEN 0 ELSE 1 END AS [pk] \
             FROM INFORMATION_SCHEMA.COLUMNS c \
             LEFT JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
               ON kcu.TABLE_NAME = c.TABLE_NAME AND kcu.COLUMN_NAME = c.COLUMN_NAME \
               AND OBJECTPROPERTY(OBJECT_ID(kcu.CONSTRAINT_NAME), 'IsPrimaryKey') = 1 \
             WHERE c.TABLE_NAME = '{}' ORDER BY c.ORDINAL_POSITION",
            escape_literal(table)
        )
    }

    fn list_indexes_sql(&self, table: &str) -> String {
        format!(
            "SELECT i.name AS [name], CASE WHEN i.is_unique = 1 THEN 1 ELSE 0 END AS [unique] \
             FROM sys.indexes i \
             WHERE i.object_id = OBJECT_ID('{}') AND i.is_primary_key = 0 AND i.name IS NOT NULL",
            escape_literal(table)
        )
    }

    fn index_columns_sql(&self, table: &str, index: &str) -> String {
        format!(
            "SELECT col.name AS [name] \
             FROM sys.indexes i \
             JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id \
             JOIN sys.columns col ON col.object_id = ic.object_id AND col.column_id = ic.column_id \
             WHERE i.object_id = OBJECT_ID('{}') AND i.name = '{}' \
             ORDER BY ic.key_ordinal",
            escape_literal(table),
            escape_literal(index)
        )
    }

    fn drop_index_sql(&self, table: &str, index: &str) -> String {
        let mut sql = String::from("DROP INDEX ");
        self.quote_into(index, &mut sql);
        sql.push_str(" ON ");
        self.quote_into(table, &mut sql);
        sql
    }
}
