//! Schema management: DDL from metadata, index management, validation.

use crate::dialect::Dialect;
use crate::error::Result;
use crate::meta::{EntityMeta, IndexMeta};
use crate::repository::{ExecCtx, Source};

/// The outcome of validating a live table against its descriptor.
#[derive(Debug, Default)]
pub struct SchemaReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// A secondary index as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

pub(crate) fn create_table_sql(meta: &EntityMeta, dialect: &dyn Dialect) -> String {
    let mut sql = String::from(dialect.create_table_prefix());
    dialect.quote_into(meta.table(), &mut sql);
    sql.push_str(" (");
    for (i, column) in meta.columns().iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        dialect.column_ddl(column, &mut sql);
    }
    sql.push(')');
    sql
}

pub(crate) fn create_index_sql(
    meta: &EntityMeta,
    index: &IndexMeta,
    dialect: &dyn Dialect,
) -> String {
    let mut sql = String::from("CREATE ");
    if index.unique {
        sql.push_str("UNIQUE ");
    }
    sql.push_str("INDEX ");
    if dialect.supports_create_index_if_not_exists() {
        sql.push_str("IF NOT EXISTS ");
    }
    dialect.quote_into(&index.name, &mut sql);
    sql.push_str(" ON ");
    dialect.quote_into(meta.table(), &mut sql);
    sql.push_str(" (");
    for (i, column) in index.columns.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        dialect.quote_into(column, &mut sql);
    }
    sql.push(')');
    sql
}

/// Create the table and every declared index, tolerating prior existence.
pub(crate) async fn initialize(
    ctx: &ExecCtx<'_>,
    source: &mut Source<'_>,
    meta: &EntityMeta,
) -> Result<()> {
    let sql = create_table_sql(meta, ctx.dialect);
    ctx.execute(&mut *source, &sql, Vec::new()).await?;
    create_indexes(ctx, source, meta).await
}

pub(crate) async fn create_indexes(
    ctx: &ExecCtx<'_>,
    source: &mut Source<'_>,
    meta: &EntityMeta,
) -> Result<()> {
    for index in meta.indexes() {
        let sql = create_index_sql(meta, index, ctx.dialect);
        ctx.execute(&mut *source, &sql, Vec::new()).await?;
    }
    Ok(())
}

pub(crate) async fn list_indexes(
    ctx: &ExecCtx<'_>,
    source: &mut Source<'_>,
    meta: &EntityMeta,
) -> Result<Vec<IndexInfo>> {
    let rows = ctx
        .fetch(&mut *source, &ctx.dialect.list_indexes_sql(meta.table()), Vec::new())
        .await?;

    let mut indexes = Vec::with_capacity(rows.len());
    for row in rows {
        let name: String = row.try_get("name")?;
        let unique: bool = row.try_get("unique")?;

        let column_rows = ctx
            .fetch(
                &mut *source,
                &ctx.dialect.index_columns_sql(meta.table(), &name),
                Vec::new(),
            )
            .await?;
        let columns = column_rows
            .iter()
            .map(|r| r.try_get::<String>("name"))
            .collect::<Result<_>>()?;

        indexes.push(IndexInfo {
            name,
            columns,
            unique,
        });
    }

    Ok(indexes)
}

pub(crate) async fn drop_index(
    ctx: &ExecCtx<'_>,
    source: &mut Source<'_>,
    meta: &EntityMeta,
    name: &str,
) -> Result<()> {
    let sql = ctx.dialect.drop_index_sql(meta.table(), name);
    ctx.execute(source, &sql, Vec::new()).await?;
    Ok(())
}

/// Compare the live table against the descriptor.
///
/// Missing table, missing columns and primary-key disagreement are errors;
/// type or nullability drift and undeclared extra columns are warnings, since
/// the engine can still operate through them.
pub(crate) async fn validate(
    ctx: &ExecCtx<'_>,
    source: &mut Source<'_>,
    meta: &EntityMeta,
) -> Result<SchemaReport> {
    let mut report = SchemaReport::default();

    let rows = ctx
        .fetch(
            &mut *source,
            &ctx.dialect.describe_columns_sql(meta.table()),
            Vec::new(),
        )
        .await?;

    if rows.is_empty() {
        report
            .errors
            .push(format!("table `{}` does not exist", meta.table()));
        return Ok(report);
    }

    struct Live {
        ty: String,
        notnull: bool,
        pk: bool,
    }

    let mut live = std::collections::HashMap::new();
    for row in &rows {
        live.insert(
            row.try_get::<String>("name")?,
            Live {
                ty: row.try_get("type")?,
                // pragma/pk columns report positions, not just flags
                notnull: row.try_get::<i64>("notnull")? != 0,
                pk: row.try_get::<i64>("pk")? != 0,
            },
        );
    }

    for column in meta.columns() {
        let Some(actual) = live.remove(&column.name) else {
            report
                .errors
                .push(format!("column `{}` is missing", column.name));
            continue;
        };

        if actual.pk != column.primary_key {
            report.errors.push(format!(
                "column `{}`: primary key flag differs (declared {}, found {})",
                column.name, column.primary_key, actual.pk
            ));
        }

        let expected_ty = ctx.dialect.column_type(&column.ty);
        if !actual.ty.eq_ignore_ascii_case(&expected_ty) {
            report.warnings.push(format!(
                "column `{}`: type `{}` differs from declared `{expected_ty}`",
                column.name, actual.ty
            ));
        }

        if !column.nullable && !column.primary_key && !actual.notnull {
            report.warnings.push(format!(
                "column `{}` is declared NOT NULL but the table allows NULL",
                column.name
            ));
        }
    }

    for name in live.keys() {
        report
            .warnings
            .push(format!("table has undeclared column `{name}`"));
    }

    report.valid = report.errors.is_empty();
    Ok(report)
}
