use super::{
    escape_literal, quote_double, write_limit_offset_standard, Dialect, IsolationLevel,
    KeyRecovery, UpsertForm,
};
use crate::types::LogicalType;

/// The SQLite dialect.
///
/// Decimal columns map to TEXT: SQLite has no exact numeric type, and TEXT
/// affinity preserves the engine's canonical decimal encoding bit-for-bit.
/// Intervals are stored as whole microseconds in an INTEGER column.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_into(&self, ident: &str, out: &mut String) {
        quote_double(ident, out);
    }

    fn placeholder(&self, _index: usize, out: &mut String) {
        out.push('?');
    }

    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>, out: &mut String) {
        write_limit_offset_standard(limit, offset, "-1", out);
    }

    fn max_bind_params(&self) -> usize {
        // SQLITE_MAX_VARIABLE_NUMBER for SQLite < 3.32.0; newer builds allow
        // 32766 but the conservative bound works everywhere.
        999
    }

    fn key_recovery(&self) -> KeyRecovery {
        KeyRecovery::LastInsertId
    }

    fn upsert_form(&self) -> UpsertForm {
        UpsertForm::OnConflict
    }

    fn column_type(&self, ty: &LogicalType) -> String {
        match ty {
            LogicalType::Bool
            | LogicalType::Short
            | LogicalType::Int
            | LogicalType::Long
            | LogicalType::Interval
            | LogicalType::Enum(crate::types::EnumRepr::Int) => "INTEGER".into(),
            LogicalType::Double => "REAL".into(),
            LogicalType::Bytes => "BLOB".into(),
            LogicalType::Decimal { .. }
            | LogicalType::Text { .. }
            | LogicalType::DateTime
            | LogicalType::DateTimeOffset
            | LogicalType::Guid
            | LogicalType::Enum(crate::types::EnumRepr::Text) => "TEXT".into(),
        }
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "AUTOINCREMENT"
    }

    fn begin_statements(&self, _level: Option<IsolationLevel>) -> Vec<String> {
        // SQLite transactions are always serializable; the level is accepted
        // and ignored.
        vec!["BEGIN".into()]
    }

    fn describe_columns_sql(&self, table: &str) -> String {
        format!(
            "SELECT \"name\", \"type\", \"notnull\", \"pk\" FROM pragma_table_info('{}') ORDER BY \"cid\"",
            escape_literal(table)
        )
    }

    fn list_indexes_sql(&self, table: &str) -> String {
        // origin 'c' keeps only indexes from CREATE INDEX, not implicit
        // unique/pk indexes
        format!(
            "SELECT \"name\", \"unique\" FROM pragma_index_list('{}') WHERE \"origin\" = 'c'",
            escape_literal(table)
        )
    }

    fn index_columns_sql(&self, _table: &str, index: &str) -> String {
        format!(
            "SELECT \"name\" FROM pragma_index_info('{}') ORDER BY \"seqno\"",
            escape_literal(index)
        )
    }

    fn drop_index_sql(&self, _table: &str, index: &str) -> String {
        let mut sql = String::from("DROP INDEX ");
        self.quote_into(index, &mut sql);
        sql
    }
}
