//! Rendering of INSERT / UPDATE / DELETE / UPSERT statements.
//!
//! Planners are pure: they take metadata plus a full-width value row (aligned
//! with `EntityMeta::columns`) and produce SQL text with its ordered
//! parameters. Execution, key writeback and error classification stay in the
//! repository.

use chrono::Utc;

use crate::dialect::{Dialect, KeyRecovery, UpsertForm};
use crate::error::{Error, Result};
use crate::expr::translate::SqlWriter;
use crate::expr::Expr;
use crate::meta::{EntityMeta, VersionRole};
use crate::types::Value;

pub(crate) struct InsertPlan {
    pub sql: String,
    pub params: Vec<Value>,
    /// The generated key comes back as a result row (RETURNING / OUTPUT)
    /// rather than from the connection's last-insert-id.
    pub key_in_rows: bool,
}

pub(crate) struct UpdatePlan {
    pub sql: String,
    pub params: Vec<Value>,
    pub guards_version: bool,
    /// Value to write back into the entity's version column on success.
    pub next_version: Option<Value>,
}

fn column_index(meta: &EntityMeta, name: &str) -> usize {
    meta.columns()
        .iter()
        .position(|c| c.name == name)
        .expect("(bug) column vanished from its own descriptor")
}

/// Rows per chunk so that `columns * rows <= max_bind_params`.
pub(crate) fn chunk_capacity(dialect: &dyn Dialect, columns: usize) -> usize {
    (dialect.max_bind_params() / columns.max(1)).max(1)
}

/// A fresh monotonic marker for timestamp-versioned rows.
pub(crate) fn fresh_version_marker() -> Value {
    Value::DateTime(Utc::now())
}

pub(crate) fn plan_insert(meta: &EntityMeta, dialect: &dyn Dialect, row: &[Value]) -> InsertPlan {
    let mut writer = SqlWriter::new(dialect);
    let pk = meta.primary_key();

    writer.push("INSERT INTO ");
    writer.ident(meta.table());
    writer.push(" (");
    for (i, column) in meta.insert_columns().enumerate() {
        if i > 0 {
            writer.push(", ");
        }
        writer.ident(&column.name);
    }
    writer.push(")");

    let key_in_rows = pk.auto_increment
        && matches!(
            dialect.key_recovery(),
            KeyRecovery::Returning | KeyRecovery::Output
        );

    if pk.auto_increment && dialect.key_recovery() == KeyRecovery::Output {
        writer.push(" OUTPUT INSERTED.");
        writer.ident(&pk.name);
    }

    writer.push(" VALUES (");
    let mut first = true;
    for (i, column) in meta.columns().iter().enumerate() {
        if column.auto_increment {
            continue;
        }
        if !first {
            writer.push(", ");
        }
        first = false;
        writer.bind(row[i].clone());
    }
    writer.push(")");

    if pk.auto_increment && dialect.key_recovery() == KeyRecovery::Returning {
        writer.push(" RETURNING ");
        writer.ident(&pk.name);
    }

    InsertPlan {
        sql: writer.sql,
        params: writer.params,
        key_in_rows,
    }
}

/// A multi-row VALUES insert for one chunk of rows.
pub(crate) fn plan_insert_many(
    meta: &EntityMeta,
    dialect: &dyn Dialect,
    rows: &[Vec<Value>],
) -> InsertPlan {
    debug_assert!(!rows.is_empty());

    let mut writer = SqlWriter::new(dialect);

    writer.push("INSERT INTO ");
    writer.ident(meta.table());
    writer.push(" (");
    for (i, column) in meta.insert_columns().enumerate() {
        if i > 0 {
            writer.push(", ");
        }
        writer.ident(&column.name);
    }
    writer.push(") VALUES ");

    for (r, row) in rows.iter().enumerate() {
        if r > 0 {
            writer.push(", ");
        }
        writer.push("(");
        let mut first = true;
        for (i, column) in meta.columns().iter().enumerate() {
            if column.auto_increment {
                continue;
            }
            if !first {
                writer.push(", ");
            }
            first = false;
            writer.bind(row[i].clone());
        }
        writer.push(")");
    }

    InsertPlan {
        sql: writer.sql,
        params: writer.params,
        key_in_rows: false,
    }
}

/// A whole-row update guarded by the primary key and, when declared, the
/// version column. Integer versions increment inside the SET clause so the
/// bump is atomic with the guard.
pub(crate) fn plan_update(
    meta: &EntityMeta,
    dialect: &dyn Dialect,
    row: &[Value],
) -> Result<UpdatePlan> {
    let mut writer = SqlWriter::new(dialect);
    let pk = meta.primary_key();

    writer.push("UPDATE ");
    writer.ident(meta.table());
    writer.push(" SET ");

    let mut first = true;
    for (i, column) in meta.columns().iter().enumerate() {
        if column.primary_key || column.version != VersionRole::None {
            continue;
        }
        if !first {
            writer.push(", ");
        }
        first = false;
        writer.ident(&column.name);
        writer.push(" = ");
        writer.bind(row[i].clone());
    }

    let mut guards_version = false;
    let mut next_version = None;

    if let Some(version) = meta.version_column() {
        let current = row[column_index(meta, &version.name)].clone();
        if !first {
            writer.push(", ");
        }
        writer.ident(&version.name);
        match version.version {
            VersionRole::Integer => {
                writer.push(" = ");
                writer.ident(&version.name);
                writer.push(" + 1");

                let current = match current {
                    Value::Int(v) => v,
                    other => {
                        return Err(Error::type_mismatch(format!(
                            "version column `{}` holds {}, expected int",
                            version.name,
                            other.type_name()
                        )))
                    }
                };
                next_version = Some(Value::Int(current + 1));
            }
            VersionRole::Timestamp => {
                let fresh = fresh_version_marker();
                writer.push(" = ");
                writer.bind(fresh.clone());
                next_version = Some(fresh);
            }
            VersionRole::None => unreachable!(),
        }

        writer.push(" WHERE ");
        writer.ident(&pk.name);
        writer.push(" = ");
        writer.bind(row[column_index(meta, &pk.name)].clone());
        writer.push(" AND ");
        writer.ident(&version.name);
        writer.push(" = ");
        writer.bind(row[column_index(meta, &version.name)].clone());
        guards_version = true;
    } else {
        writer.push(" WHERE ");
        writer.ident(&pk.name);
        writer.push(" = ");
        writer.bind(row[column_index(meta, &pk.name)].clone());
    }

    Ok(UpdatePlan {
        sql: writer.sql,
        params: writer.params,
        guards_version,
        next_version,
    })
}

pub(crate) fn plan_delete_by_key(
    meta: &EntityMeta,
    dialect: &dyn Dialect,
    key: Value,
) -> (String, Vec<Value>) {
    let mut writer = SqlWriter::new(dialect);

    writer.push("DELETE FROM ");
    writer.ident(meta.table());
    writer.push(" WHERE ");
    writer.ident(&meta.primary_key().name);
    writer.push(" = ");
    writer.bind(key);

    (writer.sql, writer.params)
}

pub(crate) fn plan_delete_where(
    meta: &EntityMeta,
    dialect: &dyn Dialect,
    predicate: Option<&Expr>,
) -> Result<(String, Vec<Value>)> {
    let mut writer = SqlWriter::new(dialect);

    writer.push("DELETE FROM ");
    writer.ident(meta.table());
    if let Some(predicate) = predicate {
        writer.push(" WHERE ");
        writer.predicate(meta, predicate)?;
    }

    Ok((writer.sql, writer.params))
}

/// An upsert keyed on the primary key, in the dialect's native form. `row`
/// must carry a present (non-absent) key; absent keys take the plain insert
/// path instead.
pub(crate) fn plan_upsert(
    meta: &EntityMeta,
    dialect: &dyn Dialect,
    row: &[Value],
) -> Result<InsertPlan> {
    let pk = meta.primary_key();

    match dialect.upsert_form() {
        UpsertForm::OnConflict | UpsertForm::OnDuplicateKey => {
            let mut writer = SqlWriter::new(dialect);

            writer.push("INSERT INTO ");
            writer.ident(meta.table());
            writer.push(" (");
            for (i, column) in meta.columns().iter().enumerate() {
                if i > 0 {
                    writer.push(", ");
                }
                writer.ident(&column.name);
            }
            writer.push(") VALUES (");
            for (i, _) in meta.columns().iter().enumerate() {
                if i > 0 {
                    writer.push(", ");
                }
                writer.bind(row[i].clone());
            }
            writer.push(")");

            write_conflict_suffix(&mut writer, meta, dialect.upsert_form());

            Ok(InsertPlan {
                sql: writer.sql,
                params: writer.params,
                key_in_rows: false,
            })
        }

        UpsertForm::Merge => {
            let mut writer = SqlWriter::new(dialect);

            writer.push("MERGE INTO ");
            writer.ident(meta.table());
            writer.push(" AS target USING (SELECT ");
            for (i, column) in meta.columns().iter().enumerate() {
                if i > 0 {
                    writer.push(", ");
                }
                writer.bind(row[i].clone());
                writer.push(" AS ");
                writer.ident(&column.name);
            }
            writer.push(") AS source ON target.");
            writer.ident(&pk.name);
            writer.push(" = source.");
            writer.ident(&pk.name);

            writer.push(" WHEN MATCHED THEN UPDATE SET ");
            let mut first = true;
            for column in meta.columns().iter().filter(|c| !c.primary_key) {
                if !first {
                    writer.push(", ");
                }
                first = false;
                writer.push("target.");
                writer.ident(&column.name);
                writer.push(" = source.");
                writer.ident(&column.name);
            }

            writer.push(" WHEN NOT MATCHED THEN INSERT (");
            for (i, column) in meta.columns().iter().enumerate() {
                if i > 0 {
                    writer.push(", ");
                }
                writer.ident(&column.name);
            }
            writer.push(") VALUES (");
            for (i, column) in meta.columns().iter().enumerate() {
                if i > 0 {
                    writer.push(", ");
                }
                writer.push("source.");
                writer.ident(&column.name);
            }
            writer.push(");");

            Ok(InsertPlan {
                sql: writer.sql,
                params: writer.params,
                key_in_rows: false,
            })
        }
    }
}

fn write_conflict_suffix(writer: &mut SqlWriter<'_>, meta: &EntityMeta, form: UpsertForm) {
    let pk = meta.primary_key();

    if form == UpsertForm::OnConflict {
        writer.push(" ON CONFLICT (");
        writer.ident(&pk.name);
        writer.push(") DO UPDATE SET ");
        let mut first = true;
        for column in meta.columns().iter().filter(|c| !c.primary_key) {
            if !first {
                writer.push(", ");
            }
            first = false;
            writer.ident(&column.name);
            writer.push(" = excluded.");
            writer.ident(&column.name);
        }
    } else {
        writer.push(" ON DUPLICATE KEY UPDATE ");
        let mut first = true;
        for column in meta.columns().iter().filter(|c| !c.primary_key) {
            if !first {
                writer.push(", ");
            }
            first = false;
            writer.ident(&column.name);
            writer.push(" = VALUES(");
            writer.ident(&column.name);
            writer.push(")");
        }
    }
}

/// A multi-row upsert for one chunk of rows, keyed on the primary key.
/// Dialects whose upsert form is MERGE fall back to single-row statements in
/// the repository instead.
pub(crate) fn plan_upsert_many(
    meta: &EntityMeta,
    dialect: &dyn Dialect,
    rows: &[Vec<Value>],
) -> Result<InsertPlan> {
    debug_assert!(!rows.is_empty());

    let form = dialect.upsert_form();
    if form == UpsertForm::Merge {
        return Err(Error::unsupported(
            "multi-row upsert in the MERGE dialect form",
        ));
    }

    let mut writer = SqlWriter::new(dialect);

    writer.push("INSERT INTO ");
    writer.ident(meta.table());
    writer.push(" (");
    for (i, column) in meta.columns().iter().enumerate() {
        if i > 0 {
            writer.push(", ");
        }
        writer.ident(&column.name);
    }
    writer.push(") VALUES ");
    for (r, row) in rows.iter().enumerate() {
        if r > 0 {
            writer.push(", ");
        }
        writer.push("(");
        for (i, _) in meta.columns().iter().enumerate() {
            if i > 0 {
                writer.push(", ");
            }
            writer.bind(row[i].clone());
        }
        writer.push(")");
    }

    write_conflict_suffix(&mut writer, meta, form);

    Ok(InsertPlan {
        sql: writer.sql,
        params: writer.params,
        key_in_rows: false,
    })
}

/// An update whose SET list comes from per-row assignment expressions; the
/// right-hand sides may reference the row's current column values.
pub(crate) fn plan_batch_update(
    meta: &EntityMeta,
    dialect: &dyn Dialect,
    assignments: &[(String, Expr)],
    predicate: Option<&Expr>,
) -> Result<(String, Vec<Value>)> {
    if assignments.is_empty() {
        return Err(Error::unsupported("batch update with no assignments"));
    }

    let mut writer = SqlWriter::new(dialect);

    writer.push("UPDATE ");
    writer.ident(meta.table());
    writer.push(" SET ");

    for (i, (column, value)) in assignments.iter().enumerate() {
        if meta.column(column).is_none() {
            return Err(Error::unsupported(format!(
                "unknown column `{column}` on entity `{}`",
                meta.entity()
            )));
        }
        if i > 0 {
            writer.push(", ");
        }
        writer.ident(column);
        writer.push(" = ");
        writer.predicate(meta, value)?;
    }

    if let Some(predicate) = predicate {
        writer.push(" WHERE ");
        writer.predicate(meta, predicate)?;
    }

    Ok((writer.sql, writer.params))
}
