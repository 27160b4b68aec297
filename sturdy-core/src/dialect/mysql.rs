use super::{
    escape_literal, write_limit_offset_standard, Dialect, IsolationLevel, KeyRecovery, UpsertForm,
};
use crate::types::{EnumRepr, LogicalType};

/// The MySQL / MariaDB dialect (translation target).
#[derive(Debug, Clone, Copy, Default)]
pub struct MySql;

impl Dialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_into(&self, ident: &str, out: &mut String) {
        out.push('`');
        for ch in ident.chars() {
            if ch == '`' {
                out.push('`');
            }
            out.push(ch);
        }
        out.push('`');
    }

    fn placeholder(&self, _index: usize, out: &mut String) {
        out.push('?');
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>, out: &mut String) {
        // MySQL's documented "all rows" limit form
        write_limit_offset_standard(limit, offset, "18446744073709551615", out);
    }

    fn length_function(&self) -> &'static str {
        "CHAR_LENGTH"
    }

    fn max_bind_params(&self) -> usize {
        65_535
    }

    fn key_recovery(&self) -> KeyRecovery {
        KeyRecovery::LastInsertId
    }

    fn upsert_form(&self) -> UpsertForm {
        UpsertForm::OnDuplicateKey
    }

    fn column_type(&self, ty: &LogicalType) -> String {
        match ty {
            LogicalType::Bool => "TINYINT(1)".into(),
            LogicalType::Short => "SMALLINT".into(),
            LogicalType::Int => "INT".into(),
            LogicalType::Long | LogicalType::Interval => "BIGINT".into(),
            LogicalType::Double => "DOUBLE".into(),
            LogicalType::Decimal { precision, scale } => {
                format!("DECIMAL({precision},{scale})")
            }
            LogicalType::Text { max_len: Some(n) } => format!("VARCHAR({n})"),
            LogicalType::Text { max_len: None } => "TEXT".into(),
            LogicalType::Bytes => "BLOB".into(),
            LogicalType::DateTime => "DATETIME".into(),
            LogicalType::DateTimeOffset => "VARCHAR(40)".into(),
            LogicalType::Guid => "CHAR(36)".into(),
            LogicalType::Enum(EnumRepr::Int) => "INT".into(),
            LogicalType::Enum(EnumRepr::Text) => "VARCHAR(64)".into(),
        }
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "AUTO_INCREMENT"
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
        statements.push("START TRANSACTION".into());
        statements
    }

    fn describe_columns_sql(&self, table: &str) -> String {
        format!(
            "SELECT COLUMN_NAME AS `name`, DATA_TYPE AS `type`, \
             IF(IS_NULLABLE = 'NO', 1, 0) AS `notnull`, \
             IF(COLUMN_KEY = 'PRI', 1, 0) AS `pk` \
             FROM information_schema.columns \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = '{}' \
             ORDER BY ORDINAL_POSITION",
            escape_literal(table)
        )
    }

    fn list_indexes_sql(&self, table: &str) -> String {
        format!(
            "SELECT DISTINCT INDEX_NAME AS `name`, IF(NON_UNIQUE = 0, 1, 0) AS `unique` \
             FROM information_schema.statistics \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = '{}' AND INDEX_NAME <> 'PRIMARY'",
            escape_literal(table)
        )
    }

    fn index_columns_sql(&self, table: &str, index: &str) -> String {
        format!(
            "SELECT COLUMN_NAME AS `name` FROM information_schema.statistics \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = '{}' AND INDEX_NAME = '{}' \
             ORDER BY SEQ_IN_INDEX",
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
