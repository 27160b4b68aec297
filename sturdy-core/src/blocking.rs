//! A synchronous façade over the async engine.
//!
//! Each blocking [`Database`] owns a current-thread tokio runtime and drives
//! the async engine on it; both façades share the same pool, translator and
//! semantics. Intended for callers that cannot be async — do not call these
//! methods from inside an async context.

use std::sync::Arc;

use tokio::runtime::Runtime;

use crate::error::{Error, Result};
use crate::expr::Expr;
use crate::dialect::IsolationLevel;
use crate::meta::Entity;
use crate::options::ConnectOptions;
use crate::repository::BatchOutcome;
use crate::row::Row;
use crate::schema::{IndexInfo, SchemaReport};
use crate::types::{FromValue, IntoValue, Value};

/// Blocking counterpart of [`crate::Database`].
pub struct Database {
    inner: crate::Database,
    rt: Arc<Runtime>,
}

fn runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::protocol(format!("failed to start blocking runtime: {e}")))
}

impl Database {
    pub fn connect(url: &str) -> Result<Self> {
        Self::connect_with(ConnectOptions::new(url))
    }

    pub fn connect_with(options: ConnectOptions) -> Result<Self> {
        let rt = runtime()?;
        let inner = rt.block_on(crate::Database::connect_with(options))?;
        Ok(Database {
            inner,
            rt: Arc::new(rt),
        })
    }

    pub fn repository<E: Entity>(&self) -> Result<Repository<E>> {
        Ok(Repository {
            inner: self.inner.repository::<E>()?,
            rt: Arc::clone(&self.rt),
        })
    }

    pub fn begin_transaction(&self) -> Result<Transaction> {
        let inner = self.rt.block_on(self.inner.begin_transaction())?;
        Ok(Transaction {
            inner: Some(inner),
            rt: Arc::clone(&self.rt),
        })
    }

    pub fn begin_transaction_with(&self, level: IsolationLevel) -> Result<Transaction> {
        let inner = self.rt.block_on(self.inner.begin_transaction_with(level))?;
        Ok(Transaction {
            inner: Some(inner),
            rt: Arc::clone(&self.rt),
        })
    }

    pub fn close(&self) {
        self.rt.block_on(self.inner.close());
    }
}

/// Blocking counterpart of [`crate::Transaction`]; dropping an uncommitted
/// handle rolls back, exactly like the async form.
pub struct Transaction {
    inner: Option<crate::Transaction>,
    rt: Arc<Runtime>,
}

impl Transaction {
    pub fn commit(mut self) -> Result<()> {
        let inner = self.take()?;
        self.rt.block_on(inner.commit())
    }

    pub fn rollback(mut self) -> Result<()> {
        let inner = self.take()?;
        self.rt.block_on(inner.rollback())
    }

    fn take(&mut self) -> Result<crate::Transaction> {
        self.inner
            .take()
            .ok_or_else(|| Error::invalid_state("operation on a completed transaction"))
    }

    fn get(&mut self) -> Result<&mut crate::Transaction> {
        self.inner
            .as_mut()
            .ok_or_else(|| Error::invalid_state("operation on a completed transaction"))
    }
}

/// Blocking counterpart of [`crate::Repository`]. Identical semantics; every
/// method drives its async twin to completion.
pub struct Repository<E: Entity> {
    inner: crate::Repository<E>,
    rt: Arc<Runtime>,
}

impl<E: Entity> Repository<E> {
    pub fn create(&self, entity: &mut E) -> Result<()> {
        self.rt.block_on(self.inner.create(entity))
    }

    pub fn create_in(&self, tx: &mut Transaction, entity: &mut E) -> Result<()> {
        self.rt.block_on(self.inner.create_in(tx.get()?, entity))
    }

    pub fn create_many(&self, entities: &mut [E]) -> BatchOutcome {
        self.rt.block_on(self.inner.create_many(entities))
    }

    pub fn create_many_in(&self, tx: &mut Transaction, entities: &mut [E]) -> Result<u64> {
        self.rt
            .block_on(self.inner.create_many_in(tx.get()?, entities))
    }

    pub fn upsert(&self, entity: &mut E) -> Result<()> {
        self.rt.block_on(self.inner.upsert(entity))
    }

    pub fn upsert_in(&self, tx: &mut Transaction, entity: &mut E) -> Result<()> {
        self.rt.block_on(self.inner.upsert_in(tx.get()?, entity))
    }

    pub fn upsert_many(&self, entities: &mut [E]) -> BatchOutcome {
        self.rt.block_on(self.inner.upsert_many(entities))
    }

    pub fn read_by_id(&self, id: impl IntoValue) -> Result<Option<E>> {
        self.rt.block_on(self.inner.read_by_id(id))
    }

    pub fn read_by_id_in(&self, tx: &mut Transaction, id: impl IntoValue) -> Result<Option<E>> {
        self.rt.block_on(self.inner.read_by_id_in(tx.get()?, id))
    }

    pub fn read_first(&self, predicate: Option<Expr>) -> Result<Option<E>> {
        self.rt.block_on(self.inner.read_first(predicate))
    }

    pub fn read_many(&self, predicate: Expr) -> Result<Vec<E>> {
        self.rt.block_on(self.inner.read_many(predicate))
    }

    pub fn read_all(&self) -> Result<Vec<E>> {
        self.rt.block_on(self.inner.read_all())
    }

    pub fn update(&self, entity: &mut E) -> Result<()> {
        self.rt.block_on(self.inner.update(entity))
    }

    pub fn update_in(&self, tx: &mut Transaction, entity: &mut E) -> Result<()> {
        self.rt.block_on(self.inner.update_in(tx.get()?, entity))
    }

    pub fn update_field(
        &self,
        predicate: Expr,
        column: &str,
        value: impl IntoValue,
    ) -> Result<u64> {
        self.rt
            .block_on(self.inner.update_field(predicate, column, value))
    }

    pub fn batch_update(&self, predicate: Expr, assignments: Vec<(String, Expr)>) -> Result<u64> {
        self.rt
            .block_on(self.inner.batch_update(predicate, assignments))
    }

    pub fn delete(&self, entity: &E) -> Result<()> {
        self.rt.block_on(self.inner.delete(entity))
    }

    pub fn delete_in(&self, tx: &mut Transaction, entity: &E) -> Result<()> {
        self.rt.block_on(self.inner.delete_in(tx.get()?, entity))
    }

    pub fn delete_by_id(&self, id: impl IntoValue) -> Result<()> {
        self.rt.block_on(self.inner.delete_by_id(id))
    }

    pub fn delete_many(&self, predicate: Expr) -> Result<u64> {
        self.rt.block_on(self.inner.delete_many(predicate))
    }

    pub fn batch_delete(&self, predicate: Expr) -> Result<u64> {
        self.rt.block_on(self.inner.batch_delete(predicate))
    }

    pub fn delete_all(&self) -> Result<u64> {
        self.rt.block_on(self.inner.delete_all())
    }

    pub fn exists(&self, predicate: Expr) -> Result<bool> {
        self.rt.block_on(self.inner.exists(predicate))
    }

    pub fn exists_by_id(&self, id: impl IntoValue) -> Result<bool> {
        self.rt.block_on(self.inner.exists_by_id(id))
    }

    pub fn count(&self, predicate: Option<Expr>) -> Result<u64> {
        self.rt.block_on(self.inner.count(predicate))
    }

    pub fn sum<T: FromValue>(&self, column: &str, predicate: Option<Expr>) -> Result<Option<T>> {
        self.rt.block_on(self.inner.sum(column, predicate))
    }

    pub fn avg<T: FromValue>(&self, column: &str, predicate: Option<Expr>) -> Result<Option<T>> {
        self.rt.block_on(self.inner.avg(column, predicate))
    }

    pub fn min<T: FromValue>(&self, column: &str, predicate: Option<Expr>) -> Result<Option<T>> {
        self.rt.block_on(self.inner.min(column, predicate))
    }

    pub fn max<T: FromValue>(&self, column: &str, predicate: Option<Expr>) -> Result<Option<T>> {
        self.rt.block_on(self.inner.max(column, predicate))
    }

    /// Raw SELECT, materialized (the blocking façade does not stream).
    pub fn from_sql(&self, sql: &str, params: Vec<Value>) -> Result<Vec<E>> {
        use futures_util::StreamExt;

        self.rt.block_on(async {
            let stream = self.inner.from_sql(sql, params).await?;
            futures_util::pin_mut!(stream);

            let mut out = Vec::new();
            while let Some(item) = stream.next().await {
                out.push(item?);
            }
            Ok(out)
        })
    }

    pub fn execute_sql(&self, sql: &str, params: Vec<Value>) -> Result<u64> {
        self.rt.block_on(self.inner.execute_sql(sql, params))
    }

    pub fn execute_sql_in(
        &self,
        tx: &mut Transaction,
        sql: &str,
        params: Vec<Value>,
    ) -> Result<u64> {
        self.rt
            .block_on(self.inner.execute_sql_in(tx.get()?, sql, params))
    }

    pub fn initialize_table(&self) -> Result<()> {
        self.rt.block_on(self.inner.initialize_table())
    }

    pub fn validate_table(&self) -> Result<SchemaReport> {
        self.rt.block_on(self.inner.validate_table())
    }

    pub fn create_indexes(&self) -> Result<()> {
        self.rt.block_on(self.inner.create_indexes())
    }

    pub fn get_indexes(&self) -> Result<Vec<IndexInfo>> {
        self.rt.block_on(self.inner.get_indexes())
    }

    pub fn drop_index(&self, name: &str) -> Result<()> {
        self.rt.block_on(self.inner.drop_index(name))
    }

    pub fn set_capture_sql(&self, capture: bool) {
        self.inner.set_capture_sql(capture)
    }

    pub fn last_executed_sql(&self) -> Option<String> {
        self.inner.last_executed_sql()
    }

    pub fn statements_executed(&self) -> u64 {
        self.inner.statements_executed()
    }

    /// Rows from a projected query, materialized.
    pub fn select_rows(&self, columns: &[&str], predicate: Option<Expr>) -> Result<Vec<Row>> {
        self.rt.block_on(async {
            let mut query = self.inner.query().select(columns.iter().copied());
            if let Some(predicate) = predicate {
                query = query.filter(predicate);
            }
            query.fetch_rows().await
        })
    }
}
