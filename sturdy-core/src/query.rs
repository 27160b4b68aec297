//! The query builder.
//!
//! Builders are value-like: every method consumes and returns the builder, and
//! nothing touches the database until a `fetch_*` call. Root-level to-one
//! includes fold into the root statement as LEFT JOINs (their columns aliased
//! `<nav>$<column>` and split back apart by the mapper); collection includes
//! and everything nested under them run as follow-up IN-list statements via
//! the include planner.

use std::any::Any;

use crate::error::{Error, Result};
use crate::expr::translate::SqlWriter;
use crate::expr::Expr;
use crate::include::{load_level, IncludeNode};
use crate::meta::{Entity, Navigation};
use crate::repository::{Repository, Source};
use crate::row::Row;
use crate::transaction::Transaction;
use crate::types::Value;

pub struct Query<'r, E: Entity> {
    repo: &'r Repository<E>,
    filter: Option<Expr>,
    raw_filters: Vec<(String, Vec<Value>)>,
    order: Vec<(Expr, bool)>,
    limit: Option<u64>,
    offset: Option<u64>,
    distinct: bool,
    projection: Option<Vec<String>>,
    includes: Vec<IncludeNode>,
    cursor: Vec<usize>,
    from_raw: Option<String>,
    ctes: Vec<(String, String)>,
    misuse: Option<String>,
}

impl<'r, E: Entity> Clone for Query<'r, E> {
    fn clone(&self) -> Self {
        Query {
            repo: self.repo,
            filter: self.filter.clone(),
            raw_filters: self.raw_filters.clone(),
            order: self.order.clone(),
            limit: self.limit,
            offset: self.offset,
            distinct: self.distinct,
            projection: self.projection.clone(),
            includes: self.includes.clone(),
            cursor: self.cursor.clone(),
            from_raw: self.from_raw.clone(),
            ctes: self.ctes.clone(),
            misuse: self.misuse.clone(),
        }
    }
}

struct JoinedInclude {
    node: IncludeNode,
    alias: String,
    prefix: String,
    target: &'static crate::meta::EntityMeta,
    local_fk: String,
}

impl<'r, E: Entity> Query<'r, E> {
    pub(crate) fn new(repo: &'r Repository<E>) -> Self {
        Query {
            repo,
            filter: None,
            raw_filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
            projection: None,
            includes: Vec::new(),
            cursor: Vec::new(),
            from_raw: None,
            ctes: Vec::new(),
            misuse: None,
        }
    }

    /// Conjoin `predicate` with any previously set filter.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(Expr::conjoin(self.filter.take(), predicate));
        self
    }

    /// Conjoin a raw SQL fragment. The fragment is inserted verbatim (in the
    /// dialect's native placeholder syntax); its parameters are merged
    /// positionally into the bind list.
    pub fn filter_raw(mut self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.raw_filters.push((sql.into(), params));
        self
    }

    /// Append an ascending sort key.
    pub fn order_by(mut self, key: Expr) -> Self {
        self.order.push((key, false));
        self
    }

    /// Append a descending sort key.
    pub fn order_by_desc(mut self, key: Expr) -> Self {
        self.order.push((key, true));
        self
    }

    /// Append a further ascending sort key.
    pub fn then_by(self, key: Expr) -> Self {
        self.order_by(key)
    }

    /// Append a further descending sort key.
    pub fn then_by_desc(self, key: Expr) -> Self {
        self.order_by_desc(key)
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    pub fn take(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Narrow the result shape to the named columns; results come back as
    /// [`Row`]s via [`fetch_rows`][Self::fetch_rows].
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Load the named navigation alongside the primary result.
    pub fn include(mut self, nav: impl Into<String>) -> Self {
        self.includes.push(IncludeNode::new(nav));
        self.cursor = vec![self.includes.len() - 1];
        self
    }

    /// Attach a further include under the most recently added include.
    pub fn then_include(mut self, nav: impl Into<String>) -> Self {
        let nav = nav.into();
        let mut appended = None;
        if let Some(node) = cursor_node(&mut self.includes, &self.cursor) {
            node.children.push(IncludeNode::new(nav));
            appended = Some(node.children.len() - 1);
        }
        match appended {
            Some(i) => self.cursor.push(i),
            None => {
                self.misuse = Some("then_include without a preceding include".into());
            }
        }
        self
    }

    /// Replace the FROM clause with a verbatim table expression.
    pub fn from_raw(mut self, table_expr: impl Into<String>) -> Self {
        self.from_raw = Some(table_expr.into());
        self
    }

    /// Prepend a common table expression.
    pub fn with_cte(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.ctes.push((name.into(), sql.into()));
        self
    }

    /// Execute and materialize every matching entity.
    pub async fn fetch_all(self) -> Result<Vec<E>> {
        let mut source = Source::Pool;
        self.fetch_with(&mut source).await
    }

    /// [`fetch_all`][Self::fetch_all] on a caller-supplied transaction.
    pub async fn fetch_all_in(self, tx: &mut Transaction) -> Result<Vec<E>> {
        let mut source = Source::Tx(tx);
        self.fetch_with(&mut source).await
    }

    /// Execute and return the first matching entity, if any.
    pub async fn fetch_first(mut self) -> Result<Option<E>> {
        self.limit = Some(1);
        Ok(self.fetch_all().await?.pop())
    }

    pub async fn fetch_first_in(mut self, tx: &mut Transaction) -> Result<Option<E>> {
        self.limit = Some(1);
        Ok(self.fetch_all_in(tx).await?.pop())
    }

    /// Execute and return raw rows; the path for [`select`][Self::select]
    /// projections.
    pub async fn fetch_rows(self) -> Result<Vec<Row>> {
        let mut source = Source::Pool;
        self.fetch_rows_with(&mut source).await
    }

    pub async fn fetch_rows_in(self, tx: &mut Transaction) -> Result<Vec<Row>> {
        let mut source = Source::Tx(tx);
        self.fetch_rows_with(&mut source).await
    }

    async fn fetch_with(self, source: &mut Source<'_>) -> Result<Vec<E>> {
        self.check_misuse()?;
        if self.projection.is_some() && !self.includes.is_empty() {
            return Err(Error::invalid_state(
                "select() cannot be combined with include(); project after loading",
            ));
        }

        let ctx = self.repo.ctx();
        let (joined, followups) = self.split_includes()?;
        let (sql, params) = self.build_select(&joined)?;

        let rows = ctx.fetch(&mut *source, &sql, params).await?;
        let mut entities: Vec<E> = rows.iter().map(E::from_row).collect::<Result<_>>()?;

        for join in &joined {
            // split the folded columns back out and materialize one child per
            // parent row whose key actually joined
            let mut children: Vec<(usize, Box<dyn Any + Send>)> = Vec::new();
            let pk = &join.target.primary_key().name;
            for (i, row) in rows.iter().enumerate() {
                let Some(sub) = row.strip_prefix(&join.prefix) else {
                    continue;
                };
                if sub.value(pk).map_or(false, |v| !v.is_null()) {
                    children.push((i, (join.target.vtable().from_row)(&sub)?));
                }
            }

            if !join.node.children.is_empty() {
                let refs: Vec<&mut (dyn Any + Send)> =
                    children.iter_mut().map(|(_, c)| &mut **c).collect();
                load_level(&ctx, &mut *source, join.target, refs, &join.node.children).await?;
            }

            for (i, child) in children {
                entities[i].attach(&join.node.nav, vec![child])?;
            }
        }

        if !followups.is_empty() {
            let refs: Vec<&mut (dyn Any + Send)> = entities
                .iter_mut()
                .map(|e| e as &mut (dyn Any + Send))
                .collect();
            load_level(&ctx, source, E::meta(), refs, &followups).await?;
        }

        Ok(entities)
    }

    async fn fetch_rows_with(self, source: &mut Source<'_>) -> Result<Vec<Row>> {
        self.check_misuse()?;
        if !self.includes.is_empty() {
            return Err(Error::invalid_state(
                "include() requires entity results; use fetch_all()",
            ));
        }

        let ctx = self.repo.ctx();
        let (sql, params) = self.build_select(&[])?;
        ctx.fetch(source, &sql, params).await
    }

    fn check_misuse(&self) -> Result<()> {
        match &self.misuse {
            Some(message) => Err(Error::invalid_state(message.clone())),
            None => Ok(()),
        }
    }

    fn split_includes(&self) -> Result<(Vec<JoinedInclude>, Vec<IncludeNode>)> {
        let meta = E::meta();
        let mut joined = Vec::new();
        let mut followups = Vec::new();

        for node in &self.includes {
            let nav = meta.navigation(&node.nav).ok_or_else(|| {
                Error::invalid_state(format!(
                    "entity `{}` has no navigation `{}`",
                    meta.entity(),
                    node.nav
                ))
            })?;

            match nav {
                // a raw FROM clause leaves nothing to qualify a join against
                Navigation::ToOne {
                    local_fk, target, ..
                } if self.from_raw.is_none() => {
                    joined.push(JoinedInclude {
                        node: node.clone(),
                        alias: format!("n{}", joined.len()),
                        prefix: format!("{}$", node.nav),
                        target: target(),
                        local_fk: local_fk.clone(),
                    });
                }
                _ => followups.push(node.clone()),
            }
        }

        Ok((joined, followups))
    }

    fn build_select(&self, joined: &[JoinedInclude]) -> Result<(String, Vec<Value>)> {
        let meta = E::meta();
        let dialect = self.repo.dialect();
        let mut writer = SqlWriter::new(dialect);

        if !self.ctes.is_empty() {
            writer.push("WITH ");
            for (i, (name, sql)) in self.ctes.iter().enumerate() {
                if i > 0 {
                    writer.push(", ");
                }
                writer.ident(name);
                writer.push(" AS (");
                writer.push(sql);
                writer.push(")");
            }
            writer.push(" ");
        }

        writer.push("SELECT ");
        if self.distinct {
            writer.push("DISTINCT ");
        }

        let qualified = !joined.is_empty();

        if let Some(projection) = &self.projection {
            for (i, column) in projection.iter().enumerate() {
                if i > 0 {
                    writer.push(", ");
                }
                writer.column_ref(meta, column)?;
            }
        } else {
            for (i, column) in meta.columns().iter().enumerate() {
                if i > 0 {
                    writer.push(", ");
                }
                if qualified {
                    writer.ident(meta.table());
                    writer.push(".");
                }
                writer.ident(&column.name);
            }
            for join in joined {
                for column in join.target.columns() {
                    writer.push(", ");
                    writer.ident(&join.alias);
                    writer.push(".");
                    writer.ident(&column.name);
                    writer.push(" AS ");
                    writer.ident(&format!("{}{}", join.prefix, column.name));
                }
            }
        }

        writer.push(" FROM ");
        match &self.from_raw {
            Some(table_expr) => writer.push(table_expr),
            None => writer.ident(meta.table()),
        }

        for join in joined {
            writer.push(" LEFT JOIN ");
            writer.ident(join.target.table());
            writer.push(" AS ");
            writer.ident(&join.alias);
            writer.push(" ON ");
            writer.ident(&join.alias);
            writer.push(".");
            writer.ident(&join.target.primary_key().name);
            writer.push(" = ");
            writer.ident(meta.table());
            writer.push(".");
            writer.ident(&join.local_fk);
        }

        if qualified {
            writer.qualify = Some(meta.table());
        }

        let has_where = self.filter.is_some() || !self.raw_filters.is_empty();
        if has_where {
            writer.push(" WHERE ");
        }
        let mut first_clause = true;
        if let Some(filter) = &self.filter {
            writer.predicate(meta, filter)?;
            first_clause = false;
        }
        for (sql, params) in &self.raw_filters {
            if !first_clause {
                writer.push(" AND ");
            }
            first_clause = false;
            writer.push("(");
            writer.push(sql);
            writer.push(")");
            writer.params.extend(params.iter().cloned());
        }

        if !self.order.is_empty() {
            writer.push(" ORDER BY ");
            for (i, (key, descending)) in self.order.iter().enumerate() {
                if i > 0 {
                    writer.push(", ");
                }
                writer.predicate(meta, key)?;
                if *descending {
                    writer.push(" DESC");
                }
            }
        } else if self.limit.is_some() || self.offset.is_some() {
            self.repo
                .diagnostics()
                .note("take/skip without order_by: row order is unspecified");
        }

        dialect.limit_offset(self.limit, self.offset, &mut writer.sql);

        writer.qualify = None;
        Ok((writer.sql, writer.params))
    }
}

fn cursor_node<'n>(
    includes: &'n mut [IncludeNode],
    cursor: &[usize],
) -> Option<&'n mut IncludeNode> {
    let (&first, rest) = cursor.split_first()?;
    let mut node = includes.get_mut(first)?;
    for &i in rest {
        node = node.children.get_mut(i)?;
    }
    Some(node)
}
