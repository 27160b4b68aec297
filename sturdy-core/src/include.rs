//! Relationship loading.
//!
//! The planner loads an include tree breadth-per-node, depth-first across
//! nodes: every navigation costs one follow-up statement per level (chunked
//! only when the parent key set exceeds the dialect's bind budget), so an
//! include graph of width `W` and depth `D` costs `O(W·D)` statements
//! regardless of how many parents were materialized.
//!
//! Levels below the root operate on type-erased entities through the
//! [`EntityVtable`][crate::meta::EntityVtable] stored in each descriptor;
//! concrete types reappear only inside `Entity::attach`.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

use futures_core::future::BoxFuture;

use crate::error::{Error, Result};
use crate::expr::translate::SqlWriter;
use crate::meta::{EntityMeta, Navigation};
use crate::mutation::chunk_capacity;
use crate::repository::{ExecCtx, Source};
use crate::row::Row;
use crate::types::Value;

/// One node of the include tree declared on a query.
#[derive(Debug, Clone)]
pub(crate) struct IncludeNode {
    pub nav: String,
    pub children: Vec<IncludeNode>,
}

impl IncludeNode {
    pub(crate) fn new(nav: impl Into<String>) -> Self {
        IncludeNode {
            nav: nav.into(),
            children: Vec::new(),
        }
    }
}

/// Value wrapper usable as a stitch key.
///
/// Keys come from primary key and foreign key columns, so `Double` keys (bit
/// equality) exist for completeness, not correctness under NaN.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Key(pub Value);

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.0).hash(state);
        match &self.0 {
            Value::Null => {}
            Value::Bool(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Double(v) => v.to_bits().hash(state),
            Value::Decimal(v) => v.hash(state),
            Value::Text(v) => v.hash(state),
            Value::Bytes(v) => v.hash(state),
            Value::DateTime(v) => v.hash(state),
            Value::DateTimeOffset(v) => v.hash(state),
            Value::Interval(v) => v.num_microseconds().hash(state),
            Value::Guid(v) => v.hash(state),
        }
    }
}

type Erased<'p> = &'p mut (dyn Any + Send);

/// Load `nodes` onto `parents`, all of entity type `meta`.
pub(crate) fn load_level<'a>(
    ctx: &'a ExecCtx<'_>,
    source: &'a mut Source<'_>,
    meta: &'static EntityMeta,
    mut parents: Vec<Erased<'a>>,
    nodes: &'a [IncludeNode],
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if parents.is_empty() {
            return Ok(());
        }

        for node in nodes {
            load_node(ctx, &mut *source, meta, &mut parents, node).await?;
        }

        Ok(())
    })
}

async fn load_node<'a>(
    ctx: &ExecCtx<'_>,
    source: &mut Source<'_>,
    meta: &'static EntityMeta,
    parents: &mut Vec<Erased<'a>>,
    node: &IncludeNode,
) -> Result<()> {
    let nav = meta.navigation(&node.nav).ok_or_else(|| {
        Error::invalid_state(format!(
            "entity `{}` has no navigation `{}`",
            meta.entity(),
            node.nav
        ))
    })?;

    match nav {
        Navigation::ToOne {
            local_fk, target, ..
        } => {
            let target = target();
            let keys = collect_keys(meta, parents, local_fk);
            if keys.is_empty() {
                return Ok(());
            }

            let pk = target.primary_key().name.clone();
            let rows = fetch_keyed(ctx, source, target, &pk, keys).await?;
            let by_key: HashMap<Key, Row> = rows
                .into_iter()
                .filter_map(|row| {
                    let key = row.value(&pk)?.clone();
                    Some((Key(key), row))
                })
                .collect();

            // one materialized child per parent, even when parents share a row
            let mut children: Vec<(usize, Box<dyn Any + Send>)> = Vec::new();
            for (i, parent) in parents.iter().enumerate() {
                let Some(fk) = (meta.vtable().column_value)(&**parent, local_fk) else {
                    continue;
                };
                if fk.is_null() {
                    continue;
                }
                if let Some(row) = by_key.get(&Key(fk)) {
                    children.push((i, (target.vtable().from_row)(row)?));
                }
            }

            descend_and_attach(ctx, source, meta, parents, target, node, children, false).await
        }

        Navigation::ToMany {
            remote_fk, target, ..
        } => {
            let target = target();
            let pk = meta.primary_key().name.clone();
            let keys = collect_keys(meta, parents, &pk);
            if keys.is_empty() {
                return Ok(());
            }

            let rows = fetch_keyed(ctx, source, target, remote_fk, keys).await?;

            let mut children: Vec<(usize, Box<dyn Any + Send>)> = Vec::new();
            let positions = key_positions(meta, parents, &pk);
            for row in &rows {
                let Some(parent_key) = row.value(remote_fk) else {
                    continue;
                };
                if let Some(&i) = positions.get(&Key(parent_key.clone())) {
                    children.push((i, (target.vtable().from_row)(row)?));
                }
            }

            descend_and_attach(ctx, source, meta, parents, target, node, children, true).await
        }

        Navigation::ManyToMany {
            link,
            this_fk,
            other_fk,
            target,
            ..
        } => {
            let (link, target) = (link(), target());
            let pk = meta.primary_key().name.clone();
            let keys = collect_keys(meta, parents, &pk);
            if keys.is_empty() {
                return Ok(());
            }

            let rows =
                fetch_linked(ctx, source, link, target, this_fk, other_fk, keys).await?;

            let mut children: Vec<(usize, Box<dyn Any + Send>)> = Vec::new();
            let positions = key_positions(meta, parents, &pk);
            for row in &rows {
                let Some(parent_key) = row.value(LINK_PARENT_ALIAS) else {
                    continue;
                };
                if let Some(&i) = positions.get(&Key(parent_key.clone())) {
                    children.push((i, (target.vtable().from_row)(row)?));
                }
            }

            descend_and_attach(ctx, source, meta, parents, target, node, children, true).await
        }
    }
}

/// Recurse into the node's own includes, then hand each parent its children.
/// `group` distinguishes collection navigations (attach once per parent, with
/// every child) from to-one (attach one child).
#[allow(clippy::too_many_arguments)]
async fn descend_and_attach<'a>(
    ctx: &ExecCtx<'_>,
    source: &mut Source<'_>,
    meta: &'static EntityMeta,
    parents: &mut Vec<Erased<'a>>,
    target: &'static EntityMeta,
    node: &IncludeNode,
    mut children: Vec<(usize, Box<dyn Any + Send>)>,
    group: bool,
) -> Result<()> {
    if !node.children.is_empty() {
        let refs: Vec<Erased<'_>> = children.iter_mut().map(|(_, c)| &mut **c).collect();
        load_level(ctx, &mut *source, target, refs, &node.children).await?;
    }

    if group {
        let mut grouped: HashMap<usize, Vec<Box<dyn Any + Send>>> = HashMap::new();
        for (i, child) in children {
            grouped.entry(i).or_default().push(child);
        }
        for (i, parent) in parents.iter_mut().enumerate() {
            let kids = grouped.remove(&i).unwrap_or_default();
            (meta.vtable().attach)(&mut **parent, &node.nav, kids)?;
        }
    } else {
        for (i, child) in children {
            (meta.vtable().attach)(&mut *parents[i], &node.nav, vec![child])?;
        }
    }

    Ok(())
}

/// Distinct, non-null key values of `column` across the parents, in first-seen
/// order.
fn collect_keys(meta: &EntityMeta, parents: &[Erased<'_>], column: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();

    for parent in parents {
        let Some(value) = (meta.vtable().column_value)(&**parent, column) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        if seen.insert(Key(value.clone())) {
            keys.push(value);
        }
    }

    keys
}

/// Key value of `column` → index of the (first) parent holding it.
fn key_positions(
    meta: &EntityMeta,
    parents: &[Erased<'_>],
    column: &str,
) -> HashMap<Key, usize> {
    let mut positions = HashMap::new();
    for (i, parent) in parents.iter().enumerate() {
        if let Some(value) = (meta.vtable().column_value)(&**parent, column) {
            if !value.is_null() {
                positions.entry(Key(value)).or_insert(i);
            }
        }
    }
    positions
}

/// `SELECT <all columns> FROM <target> WHERE <column> IN (keys…)`, chunked by
/// the dialect's bind budget.
async fn fetch_keyed(
    ctx: &ExecCtx<'_>,
    source: &mut Source<'_>,
    target: &'static EntityMeta,
    column: &str,
    keys: Vec<Value>,
) -> Result<Vec<Row>> {
    let dialect = ctx.dialect;
    let mut rows = Vec::new();

    for chunk in keys.chunks(chunk_capacity(dialect, 1)) {
        let mut writer = SqlWriter::new(dialect);
        write_select_columns(&mut writer, target);
        writer.push(" FROM ");
        writer.ident(target.table());
        writer.push(" WHERE ");
        writer.ident(column);
        writer.push(" IN (");
        for (i, key) in chunk.iter().enumerate() {
            if i > 0 {
                writer.push(", ");
            }
            writer.bind(key.clone());
        }
        writer.push(")");

        rows.extend(ctx.fetch(&mut *source, &writer.sql, writer.params).await?);
    }

    Ok(rows)
}

pub(crate) const LINK_PARENT_ALIAS: &str = "link$parent";

/// The single follow-up for a many-to-many navigation: link joined to target,
/// filtered on the parent side, carrying the parent key out as
/// [`LINK_PARENT_ALIAS`].
async fn fetch_linked(
    ctx: &ExecCtx<'_>,
    source: &mut Source<'_>,
    link: &'static EntityMeta,
    target: &'static EntityMeta,
    this_fk: &str,
    other_fk: &str,
    keys: Vec<Value>,
) -> Result<Vec<Row>> {
    let dialect = ctx.dialect;
    let mut rows = Vec::new();

    for chunk in keys.chunks(chunk_capacity(dialect, 1)) {
        let mut writer = SqlWriter::new(dialect);

        writer.push("SELECT ");
        for (i, column) in target.columns().iter().enumerate() {
            if i > 0 {
                writer.push(", ");
            }
            writer.push("t.");
            writer.ident(&column.name);
        }
        writer.push(", l.");
        writer.ident(this_fk);
        writer.push(" AS ");
        writer.ident(LINK_PARENT_ALIAS);

        writer.push(" FROM ");
        writer.ident(link.table());
        writer.push(" AS l INNER JOIN ");
        writer.ident(target.table());
        writer.push(" AS t ON t.");
        writer.ident(&target.primary_key().name);
        writer.push(" = l.");
        writer.ident(other_fk);

        writer.push(" WHERE l.");
        writer.ident(this_fk);
        writer.push(" IN (");
        for (i, key) in chunk.iter().enumerate() {
            if i > 0 {
                writer.push(", ");
            }
            writer.bind(key.clone());
        }
        writer.push(")");

        rows.extend(ctx.fetch(&mut *source, &writer.sql, writer.params).await?);
    }

    Ok(rows)
}

fn write_select_columns(writer: &mut SqlWriter<'_>, meta: &EntityMeta) {
    writer.push("SELECT ");
    for (i, column) in meta.columns().iter().enumerate() {
        if i > 0 {
            writer.push(", ");
        }
        writer.ident(&column.name);
    }
}
