//! The typed, per-entity repository surface.
//!
//! Every operation borrows a fresh pooled connection for its own duration, or
//! rides a caller-supplied [`Transaction`] via its `*_in` twin. All statement
//! traffic funnels through [`ExecCtx`] so per-handle diagnostics (captured
//! SQL, statement counts) see everything, include follow-ups included.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_core::Stream;
use futures_util::StreamExt;

use crate::connection::ExecuteResult;
use crate::database::Database;
use crate::dialect::{Dialect, IsolationLevel};
use crate::error::{Error, Result};
use crate::expr::translate::SqlWriter;
use crate::expr::{col, AggregateFunction, Expr};
use crate::meta::{Entity, VersionRole};
use crate::mutation::{
    chunk_capacity, fresh_version_marker, plan_delete_by_key, plan_delete_where, plan_insert,
    plan_insert_many, plan_update, plan_upsert, plan_upsert_many,
};
use crate::query::Query;
use crate::row::Row;
use crate::schema::{self, IndexInfo, SchemaReport};
use crate::transaction::Transaction;
use crate::types::{FromValue, IntoValue, Value};
use crate::pool::Pool;

/// Where an operation's statements run: a fresh pooled connection per
/// statement, or one pinned transaction connection.
pub(crate) enum Source<'t> {
    Pool,
    Tx(&'t mut Transaction),
}

/// Per-handle diagnostics; purely observational.
pub(crate) struct Diagnostics {
    capture: AtomicBool,
    last_sql: Mutex<Option<String>>,
    statements: AtomicU64,
    last_note: Mutex<Option<String>>,
}

impl Diagnostics {
    fn new() -> Self {
        Diagnostics {
            capture: AtomicBool::new(false),
            last_sql: Mutex::new(None),
            statements: AtomicU64::new(0),
            last_note: Mutex::new(None),
        }
    }

    pub(crate) fn record(&self, sql: &str) {
        self.statements.fetch_add(1, Ordering::Relaxed);
        if self.capture.load(Ordering::Relaxed) {
            *self.last_sql.lock().unwrap() = Some(sql.to_owned());
        }
    }

    pub(crate) fn note(&self, note: &str) {
        *self.last_note.lock().unwrap() = Some(note.to_owned());
    }
}

/// Execution context handed to the query builder, include planner and schema
/// manager; not generic so the include planner stays type-erased.
pub(crate) struct ExecCtx<'r> {
    pub(crate) pool: &'r Pool,
    pub(crate) dialect: &'static dyn Dialect,
    pub(crate) diag: &'r Diagnostics,
}

impl ExecCtx<'_> {
    pub(crate) async fn fetch(
        &self,
        source: &mut Source<'_>,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Vec<Row>> {
        self.diag.record(sql);
        match source {
            Source::Pool => {
                let mut conn = self.pool.acquire().await?;
                conn.fetch_all(sql, params).await
            }
            Source::Tx(tx) => tx.connection()?.fetch_all(sql, params).await,
        }
    }

    pub(crate) async fn execute(
        &self,
        source: &mut Source<'_>,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<ExecuteResult> {
        self.diag.record(sql);
        match source {
            Source::Pool => {
                let mut conn = self.pool.acquire().await?;
                conn.execute(sql, params).await
            }
            Source::Tx(tx) => tx.connection()?.execute(sql, params).await,
        }
    }
}

/// The outcome of a bulk mutation running outside a transaction, where each
/// chunk is its own unit of failure.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Rows affected by the chunks that succeeded.
    pub affected: u64,
    /// The first error encountered, if any chunk failed.
    pub first_error: Option<Error>,
}

impl BatchOutcome {
    /// Collapse into a `Result`, discarding the partial-success count on error.
    pub fn into_result(self) -> Result<u64> {
        match self.first_error {
            Some(e) => Err(e),
            None => Ok(self.affected),
        }
    }
}

/// A typed repository over one entity's table.
///
/// Cheap to clone; clones share the same pool and the same diagnostics
/// handle. The repository itself is thread-safe: concurrent operations each
/// borrow their own connection.
pub struct Repository<E: Entity> {
    db: Database,
    diag: Arc<Diagnostics>,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Repository {
            db: self.db.clone(),
            diag: Arc::clone(&self.diag),
            _marker: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub(crate) fn new(db: Database) -> Self {
        Repository {
            db,
            diag: Arc::new(Diagnostics::new()),
            _marker: PhantomData,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub(crate) fn dialect(&self) -> &'static dyn Dialect {
        self.db.pool().dialect()
    }

    pub(crate) fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }

    pub(crate) fn ctx(&self) -> ExecCtx<'_> {
        ExecCtx {
            pool: self.db.pool(),
            dialect: self.dialect(),
            diag: &self.diag,
        }
    }

    /// Start a query against this entity's table.
    pub fn query(&self) -> Query<'_, E> {
        Query::new(self)
    }

    // ---- diagnostics -----------------------------------------------------

    /// Toggle capturing of executed SQL on this handle. Disabling capture
    /// immediately clears the last captured statement.
    pub fn set_capture_sql(&self, capture: bool) {
        self.diag.capture.store(capture, Ordering::Relaxed);
        if !capture {
            *self.diag.last_sql.lock().unwrap() = None;
        }
    }

    pub fn capture_sql(&self) -> bool {
        self.diag.capture.load(Ordering::Relaxed)
    }

    /// The last statement this handle emitted, when capture is on.
    pub fn last_executed_sql(&self) -> Option<String> {
        self.diag.last_sql.lock().unwrap().clone()
    }

    /// Statements executed through this handle since it was created.
    pub fn statements_executed(&self) -> u64 {
        self.diag.statements.load(Ordering::Relaxed)
    }

    /// The last non-fatal diagnostic (e.g. paging without an order).
    pub fn last_diagnostic(&self) -> Option<String> {
        self.diag.last_note.lock().unwrap().clone()
    }

    // ---- create ----------------------------------------------------------

    /// Insert `entity`. A generated key and a seeded version column are
    /// written back into the entity.
    pub async fn create(&self, entity: &mut E) -> Result<()> {
        self.create_on(&mut Source::Pool, entity).await
    }

    pub async fn create_in(&self, tx: &mut Transaction, entity: &mut E) -> Result<()> {
        self.create_on(&mut Source::Tx(tx), entity).await
    }

    async fn create_on(&self, source: &mut Source<'_>, entity: &mut E) -> Result<()> {
        let meta = E::meta();
        seed_version(entity)?;

        let row = entity.values();
        let plan = plan_insert(meta, self.dialect(), &row);
        let pk = meta.primary_key();
        let ctx = self.ctx();

        if plan.key_in_rows {
            let rows = ctx.fetch(source, &plan.sql, plan.params).await?;
            let key = rows
                .first()
                .and_then(|row| row.value_at(0))
                .ok_or_else(|| Error::protocol("insert returned no generated key"))?
                .clone();
            entity.put(&pk.name, key)?;
        } else {
            let done = ctx.execute(source, &plan.sql, plan.params).await?;
            if pk.auto_increment {
                let key = done
                    .last_insert_id
                    .ok_or_else(|| Error::protocol("driver reported no generated key"))?;
                entity.put(&pk.name, Value::Int(key))?;
            }
        }

        Ok(())
    }

    /// Insert many entities in chunked multi-row statements. Outside a
    /// transaction each chunk is its own unit of failure; generated keys are
    /// not read back on the bulk path.
    pub async fn create_many(&self, entities: &mut [E]) -> BatchOutcome {
        self.create_many_on(&mut Source::Pool, entities, false).await
    }

    /// Chunked insert riding `tx`: all chunks commit or roll back together.
    pub async fn create_many_in(&self, tx: &mut Transaction, entities: &mut [E]) -> Result<u64> {
        self.create_many_on(&mut Source::Tx(tx), entities, true)
            .await
            .into_result()
    }

    async fn create_many_on(
        &self,
        source: &mut Source<'_>,
        entities: &mut [E],
        stop_on_error: bool,
    ) -> BatchOutcome {
        let meta = E::meta();
        let mut outcome = BatchOutcome {
            affected: 0,
            first_error: None,
        };

        for entity in entities.iter_mut() {
            if let Err(e) = seed_version(entity) {
                outcome.first_error = Some(e);
                return outcome;
            }
        }

        let rows: Vec<Vec<Value>> = entities.iter().map(Entity::values).collect();
        let columns = meta.insert_columns().count();
        let ctx = self.ctx();

        for chunk in rows.chunks(chunk_capacity(self.dialect(), columns)) {
            let plan = plan_insert_many(meta, self.dialect(), chunk);
            match ctx.execute(&mut *source, &plan.sql, plan.params).await {
                Ok(done) => outcome.affected += done.rows_affected,
                Err(e) => {
                    if outcome.first_error.is_none() {
                        outcome.first_error = Some(e);
                    }
                    if stop_on_error {
                        return outcome;
                    }
                }
            }
        }

        outcome
    }

    // ---- upsert ----------------------------------------------------------

    /// Insert or update keyed on the primary key. An absent (NULL or zero)
    /// key takes the plain insert path.
    pub async fn upsert(&self, entity: &mut E) -> Result<()> {
        self.upsert_on(&mut Source::Pool, entity).await
    }

    pub async fn upsert_in(&self, tx: &mut Transaction, entity: &mut E) -> Result<()> {
        self.upsert_on(&mut Source::Tx(tx), entity).await
    }

    async fn upsert_on(&self, source: &mut Source<'_>, entity: &mut E) -> Result<()> {
        let meta = E::meta();
        let pk = meta.primary_key();
        let key = entity.value_of(&pk.name).unwrap_or(Value::Null);

        if key.is_absent_key() {
            return self.create_on(source, entity).await;
        }

        let row = entity.values();
        let plan = plan_upsert(meta, self.dialect(), &row)?;
        self.ctx().execute(source, &plan.sql, plan.params).await?;
        Ok(())
    }

    /// Bulk upsert with the same chunking rule as bulk insert. Rows with
    /// absent keys are inserted; the rest upsert keyed on the primary key.
    pub async fn upsert_many(&self, entities: &mut [E]) -> BatchOutcome {
        self.upsert_many_on(&mut Source::Pool, entities, false).await
    }

    pub async fn upsert_many_in(&self, tx: &mut Transaction, entities: &mut [E]) -> Result<u64> {
        self.upsert_many_on(&mut Source::Tx(tx), entities, true)
            .await
            .into_result()
    }

    async fn upsert_many_on(
        &self,
        source: &mut Source<'_>,
        entities: &mut [E],
        stop_on_error: bool,
    ) -> BatchOutcome {
        let meta = E::meta();
        let pk_name = meta.primary_key().name.clone();
        let mut outcome = BatchOutcome {
            affected: 0,
            first_error: None,
        };

        let mut inserts: Vec<&mut E> = Vec::new();
        let mut upserts: Vec<Vec<Value>> = Vec::new();
        for entity in entities.iter_mut() {
            let key = entity.value_of(&pk_name).unwrap_or(Value::Null);
            if key.is_absent_key() {
                inserts.push(entity);
            } else {
                upserts.push(entity.values());
            }
        }

        let ctx = self.ctx();

        for entity in inserts {
            match self.create_on(&mut *source, entity).await {
                Ok(()) => outcome.affected += 1,
                Err(e) => {
                    if outcome.first_error.is_none() {
                        outcome.first_error = Some(e);
                    }
                    if stop_on_error {
                        return outcome;
                    }
                }
            }
        }

        let columns = meta.columns().len();
        for chunk in upserts.chunks(chunk_capacity(self.dialect(), columns)) {
            let result = match plan_upsert_many(meta, self.dialect(), chunk) {
                Ok(plan) => ctx
                    .execute(&mut *source, &plan.sql, plan.params)
                    .await
                    .map(|done| done.rows_affected.min(chunk.len() as u64)),
                // MERGE dialects upsert row by row
                Err(_) => {
                    let mut affected = 0;
                    let mut failure = None;
                    for row in chunk {
                        let plan = match plan_upsert(meta, self.dialect(), row) {
                            Ok(plan) => plan,
                            Err(e) => {
                                failure = Some(e);
                                break;
                            }
                        };
                        match ctx.execute(&mut *source, &plan.sql, plan.params).await {
                            Ok(_) => affected += 1,
                            Err(e) => {
                                failure = Some(e);
                                break;
                            }
                        }
                    }
                    match failure {
                        Some(e) => Err(e),
                        None => Ok(affected),
                    }
                }
            };

            match result {
                Ok(n) => outcome.affected += n,
                Err(e) => {
                    if outcome.first_error.is_none() {
                        outcome.first_error = Some(e);
                    }
                    if stop_on_error {
                        return outcome;
                    }
                }
            }
        }

        outcome
    }

    // ---- read ------------------------------------------------------------

    pub async fn read_by_id(&self, id: impl IntoValue) -> Result<Option<E>> {
        self.query().filter(self.pk_predicate(id)).fetch_first().await
    }

    pub async fn read_by_id_in(
        &self,
        tx: &mut Transaction,
        id: impl IntoValue,
    ) -> Result<Option<E>> {
        self.query()
            .filter(self.pk_predicate(id))
            .fetch_first_in(tx)
            .await
    }

    pub async fn read_first(&self, predicate: Option<Expr>) -> Result<Option<E>> {
        let mut query = self.query();
        if let Some(predicate) = predicate {
            query = query.filter(predicate);
        }
        query.fetch_first().await
    }

    pub async fn read_first_in(
        &self,
        tx: &mut Transaction,
        predicate: Option<Expr>,
    ) -> Result<Option<E>> {
        let mut query = self.query();
        if let Some(predicate) = predicate {
            query = query.filter(predicate);
        }
        query.fetch_first_in(tx).await
    }

    pub async fn read_many(&self, predicate: Expr) -> Result<Vec<E>> {
        self.query().filter(predicate).fetch_all().await
    }

    pub async fn read_many_in(&self, tx: &mut Transaction, predicate: Expr) -> Result<Vec<E>> {
        self.query().filter(predicate).fetch_all_in(tx).await
    }

    pub async fn read_all(&self) -> Result<Vec<E>> {
        self.query().fetch_all().await
    }

    pub async fn read_all_in(&self, tx: &mut Transaction) -> Result<Vec<E>> {
        self.query().fetch_all_in(tx).await
    }

    // ---- update ----------------------------------------------------------

    /// Whole-row update keyed on the primary key. With a declared version
    /// column the update is version-guarded: a stale entity fails with
    /// [`OptimisticConcurrency`][Error::OptimisticConcurrency] and the bumped
    /// version is written back on success. Without one, a missing row fails
    /// with [`NotFound`][Error::NotFound].
    pub async fn update(&self, entity: &mut E) -> Result<()> {
        self.update_on(&mut Source::Pool, entity).await
    }

    pub async fn update_in(&self, tx: &mut Transaction, entity: &mut E) -> Result<()> {
        self.update_on(&mut Source::Tx(tx), entity).await
    }

    async fn update_on(&self, source: &mut Source<'_>, entity: &mut E) -> Result<()> {
        let meta = E::meta();
        let row = entity.values();
        let plan = plan_update(meta, self.dialect(), &row)?;

        let done = self.ctx().execute(source, &plan.sql, plan.params).await?;
        if done.rows_affected == 0 {
            return Err(if plan.guards_version {
                Error::OptimisticConcurrency
            } else {
                Error::NotFound
            });
        }

        if let (Some(version), Some(next)) = (meta.version_column(), plan.next_version) {
            entity.put(&version.name, next)?;
        }

        Ok(())
    }

    /// Set exactly one column to a literal value on every row matching
    /// `predicate`; returns the number of rows affected.
    pub async fn update_field(
        &self,
        predicate: Expr,
        column: &str,
        value: impl IntoValue,
    ) -> Result<u64> {
        self.batch_update(predicate, vec![(column.to_owned(), Expr::Value(value.into_value()))])
            .await
    }

    pub async fn update_field_in(
        &self,
        tx: &mut Transaction,
        predicate: Expr,
        column: &str,
        value: impl IntoValue,
    ) -> Result<u64> {
        self.batch_update_in(
            tx,
            predicate,
            vec![(column.to_owned(), Expr::Value(value.into_value()))],
        )
        .await
    }

    /// Update every row matching `predicate` with the given assignments; the
    /// right-hand sides may reference the row's current column values.
    pub async fn batch_update(
        &self,
        predicate: Expr,
        assignments: Vec<(String, Expr)>,
    ) -> Result<u64> {
        self.batch_update_on(&mut Source::Pool, predicate, assignments)
            .await
    }

    pub async fn batch_update_in(
        &self,
        tx: &mut Transaction,
        predicate: Expr,
        assignments: Vec<(String, Expr)>,
    ) -> Result<u64> {
        self.batch_update_on(&mut Source::Tx(tx), predicate, assignments)
            .await
    }

    async fn batch_update_on(
        &self,
        source: &mut Source<'_>,
        predicate: Expr,
        assignments: Vec<(String, Expr)>,
    ) -> Result<u64> {
        let (sql, params) = crate::mutation::plan_batch_update(
            E::meta(),
            self.dialect(),
            &assignments,
            Some(&predicate),
        )?;
        let done = self.ctx().execute(source, &sql, params).await?;
        Ok(done.rows_affected)
    }

    // ---- delete ----------------------------------------------------------

    /// Delete the row this entity maps to; fails with
    /// [`NotFound`][Error::NotFound] when no row matches its key.
    pub async fn delete(&self, entity: &E) -> Result<()> {
        let key = self.require_key(entity)?;
        self.delete_by_key_on(&mut Source::Pool, key).await
    }

    pub async fn delete_in(&self, tx: &mut Transaction, entity: &E) -> Result<()> {
        let key = self.require_key(entity)?;
        self.delete_by_key_on(&mut Source::Tx(tx), key).await
    }

    pub async fn delete_by_id(&self, id: impl IntoValue) -> Result<()> {
        self.delete_by_key_on(&mut Source::Pool, id.into_value())
            .await
    }

    pub async fn delete_by_id_in(&self, tx: &mut Transaction, id: impl IntoValue) -> Result<()> {
        self.delete_by_key_on(&mut Source::Tx(tx), id.into_value())
            .await
    }

    async fn delete_by_key_on(&self, source: &mut Source<'_>, key: Value) -> Result<()> {
        let (sql, params) = plan_delete_by_key(E::meta(), self.dialect(), key);
        let done = self.ctx().execute(source, &sql, params).await?;
        if done.rows_affected == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    /// Delete every row matching `predicate`; returns the number deleted.
    pub async fn delete_many(&self, predicate: Expr) -> Result<u64> {
        self.batch_delete(predicate).await
    }

    pub async fn delete_many_in(&self, tx: &mut Transaction, predicate: Expr) -> Result<u64> {
        self.batch_delete_in(tx, predicate).await
    }

    pub async fn batch_delete(&self, predicate: Expr) -> Result<u64> {
        self.delete_where_on(&mut Source::Pool, Some(predicate)).await
    }

    pub async fn batch_delete_in(&self, tx: &mut Transaction, predicate: Expr) -> Result<u64> {
        self.delete_where_on(&mut Source::Tx(tx), Some(predicate))
            .await
    }

    pub async fn delete_all(&self) -> Result<u64> {
        self.delete_where_on(&mut Source::Pool, None).await
    }

    pub async fn delete_all_in(&self, tx: &mut Transaction) -> Result<u64> {
        self.delete_where_on(&mut Source::Tx(tx), None).await
    }

    async fn delete_where_on(
        &self,
        source: &mut Source<'_>,
        predicate: Option<Expr>,
    ) -> Result<u64> {
        let (sql, params) = plan_delete_where(E::meta(), self.dialect(), predicate.as_ref())?;
        let done = self.ctx().execute(source, &sql, params).await?;
        Ok(done.rows_affected)
    }

    // ---- aggregates ------------------------------------------------------

    pub async fn exists(&self, predicate: Expr) -> Result<bool> {
        Ok(self.count(Some(predicate)).await? > 0)
    }

    pub async fn exists_in(&self, tx: &mut Transaction, predicate: Expr) -> Result<bool> {
        Ok(self.count_in(tx, Some(predicate)).await? > 0)
    }

    pub async fn exists_by_id(&self, id: impl IntoValue) -> Result<bool> {
        self.exists(self.pk_predicate(id)).await
    }

    pub async fn exists_by_id_in(&self, tx: &mut Transaction, id: impl IntoValue) -> Result<bool> {
        let predicate = self.pk_predicate(id);
        self.exists_in(tx, predicate).await
    }

    pub async fn count(&self, predicate: Option<Expr>) -> Result<u64> {
        let value: Option<i64> = self
            .aggregate_on(&mut Source::Pool, Expr::count_all(), predicate)
            .await?;
        Ok(value.unwrap_or(0) as u64)
    }

    pub async fn count_in(&self, tx: &mut Transaction, predicate: Option<Expr>) -> Result<u64> {
        let value: Option<i64> = self
            .aggregate_on(&mut Source::Tx(tx), Expr::count_all(), predicate)
            .await?;
        Ok(value.unwrap_or(0) as u64)
    }

    pub async fn sum<T: FromValue>(&self, column: &str, predicate: Option<Expr>) -> Result<Option<T>> {
        self.aggregate_on(
            &mut Source::Pool,
            Expr::aggregate(AggregateFunction::Sum, col(column)),
            predicate,
        )
        .await
    }

    pub async fn avg<T: FromValue>(&self, column: &str, predicate: Option<Expr>) -> Result<Option<T>> {
        self.aggregate_on(
            &mut Source::Pool,
            Expr::aggregate(AggregateFunction::Avg, col(column)),
            predicate,
        )
        .await
    }

    pub async fn min<T: FromValue>(&self, column: &str, predicate: Option<Expr>) -> Result<Option<T>> {
        self.aggregate_on(
            &mut Source::Pool,
            Expr::aggregate(AggregateFunction::Min, col(column)),
            predicate,
        )
        .await
    }

    pub async fn max<T: FromValue>(&self, column: &str, predicate: Option<Expr>) -> Result<Option<T>> {
        self.aggregate_on(
            &mut Source::Pool,
            Expr::aggregate(AggregateFunction::Max, col(column)),
            predicate,
        )
        .await
    }

    async fn aggregate_on<T: FromValue>(
        &self,
        source: &mut Source<'_>,
        aggregate: Expr,
        predicate: Option<Expr>,
    ) -> Result<Option<T>> {
        let meta = E::meta();
        let mut writer = SqlWriter::new(self.dialect());

        writer.push("SELECT ");
        writer.scalar(meta, &aggregate)?;
        writer.push(" FROM ");
        writer.ident(meta.table());
        if let Some(predicate) = &predicate {
            writer.push(" WHERE ");
            writer.predicate(meta, predicate)?;
        }

        let rows = self.ctx().fetch(source, &writer.sql, writer.params).await?;
        match rows.first().and_then(|row| row.value_at(0)) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::from_value(value).map(Some),
        }
    }

    // ---- raw SQL ---------------------------------------------------------

    /// Run a raw SELECT and lazily materialize entities as rows stream in.
    /// The borrowed connection is released when the stream is dropped or
    /// exhausted.
    pub async fn from_sql(
        &self,
        sql: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<impl Stream<Item = Result<E>> + Send + 'static> {
        let sql = sql.into();
        ensure_read_only(&sql)?;
        self.diag.record(&sql);

        let mut conn = self.db.pool().acquire().await?;
        let (tx, rx) = tokio::sync::mpsc::channel::<Result<E>>(32);

        tokio::spawn(async move {
            let mut rows = conn.raw().fetch_stream(&sql, params);
            while let Some(row) = rows.next().await {
                let item = row.and_then(|row| E::from_row(&row));
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        Ok(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }))
    }

    /// Run a raw SELECT on the transaction's connection, materialized.
    pub async fn from_sql_in(
        &self,
        tx: &mut Transaction,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<Vec<E>> {
        ensure_read_only(sql)?;
        let rows = self.ctx().fetch(&mut Source::Tx(tx), sql, params).await?;
        rows.iter().map(E::from_row).collect()
    }

    /// Run a raw statement; returns the number of rows affected.
    pub async fn execute_sql(&self, sql: &str, params: Vec<Value>) -> Result<u64> {
        let done = self.ctx().execute(&mut Source::Pool, sql, params).await?;
        Ok(done.rows_affected)
    }

    pub async fn execute_sql_in(
        &self,
        tx: &mut Transaction,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<u64> {
        let done = self.ctx().execute(&mut Source::Tx(tx), sql, params).await?;
        Ok(done.rows_affected)
    }

    // ---- transactions ----------------------------------------------------

    /// Begin a transaction at the engine's default isolation level.
    pub async fn begin_transaction(&self) -> Result<Transaction> {
        self.db.begin_transaction().await
    }

    pub async fn begin_transaction_with(&self, level: IsolationLevel) -> Result<Transaction> {
        self.db.begin_transaction_with(level).await
    }

    // ---- schema ----------------------------------------------------------

    /// Create the table and its declared indexes if they do not exist.
    pub async fn initialize_table(&self) -> Result<()> {
        schema::initialize(&self.ctx(), &mut Source::Pool, E::meta()).await
    }

    /// Validate the live table against the descriptor.
    pub async fn validate_table(&self) -> Result<SchemaReport> {
        schema::validate(&self.ctx(), &mut Source::Pool, E::meta()).await
    }

    pub async fn create_indexes(&self) -> Result<()> {
        schema::create_indexes(&self.ctx(), &mut Source::Pool, E::meta()).await
    }

    pub async fn get_indexes(&self) -> Result<Vec<IndexInfo>> {
        schema::list_indexes(&self.ctx(), &mut Source::Pool, E::meta()).await
    }

    pub async fn drop_index(&self, name: &str) -> Result<()> {
        schema::drop_index(&self.ctx(), &mut Source::Pool, E::meta(), name).await
    }

    // ---- helpers ---------------------------------------------------------

    fn pk_predicate(&self, id: impl IntoValue) -> Expr {
        col(&E::meta().primary_key().name).eq(Expr::Value(id.into_value()))
    }

    fn require_key(&self, entity: &E) -> Result<Value> {
        let pk = E::meta().primary_key();
        let key = entity.value_of(&pk.name).unwrap_or(Value::Null);
        if key.is_absent_key() {
            return Err(Error::invalid_state(format!(
                "entity `{}` has no primary key value",
                E::meta().entity()
            )));
        }
        Ok(key)
    }
}

/// Seed the version column of a fresh row: integers start at 1, timestamps at
/// the current marker.
fn seed_version<E: Entity>(entity: &mut E) -> Result<()> {
    let meta = E::meta();
    let Some(version) = meta.version_column() else {
        return Ok(());
    };

    match version.version {
        VersionRole::Integer => entity.put(&version.name, Value::Int(1)),
        VersionRole::Timestamp => entity.put(&version.name, fresh_version_marker()),
        VersionRole::None => Ok(()),
    }
}

fn ensure_read_only(sql: &str) -> Result<()> {
    let head = sql.trim_start();
    let selects = head
        .get(..6)
        .is_some_and(|p| p.eq_ignore_ascii_case("select"))
        || head.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("with"));

    if selects {
        Ok(())
    } else {
        Err(Error::invalid_state(
            "raw read queries must begin with SELECT",
        ))
    }
}
