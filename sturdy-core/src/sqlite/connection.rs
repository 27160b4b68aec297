//! One worker thread per SQLite connection.
//!
//! SQLite's C API is synchronous and its handles are not meant to hop between
//! threads mid-statement, so every connection spins up a discrete thread that
//! owns the `rusqlite::Connection` and serves commands from a channel. Command
//! order on the channel is execution order on the database, which is what lets
//! a dropped transaction queue its `ROLLBACK` without waiting for it.

use std::time::Duration;

use futures_channel::oneshot;
use futures_core::future::BoxFuture;
use futures_core::stream::BoxStream;
use rusqlite::OpenFlags;

use crate::connection::{ExecuteResult, RawConnection};
use crate::error::{Error, Result};
use crate::row::{Row, RowMeta};
use crate::types::{Value, DATETIME_FORMAT};

use super::error::{map_rusqlite_error, worker_gone};

enum Command {
    Execute {
        sql: Box<str>,
        params: Vec<Value>,
        reply: oneshot::Sender<Result<ExecuteResult>>,
    },
    FetchAll {
        sql: Box<str>,
        params: Vec<Value>,
        reply: oneshot::Sender<Result<Vec<Row>>>,
    },
    Stream {
        sql: Box<str>,
        params: Vec<Value>,
        rows: flume::Sender<Result<Row>>,
    },
    Ping {
        reply: oneshot::Sender<Result<()>>,
    },
    Rollback,
    Shutdown,
}

/// An open SQLite connection, backed by its worker thread.
#[derive(Debug)]
pub struct SqliteConnection {
    worker_tx: flume::Sender<Command>,
}

impl SqliteConnection {
    pub(crate) async fn establish(path: String) -> Result<Self> {
        let (worker_tx, worker_rx) = flume::unbounded();
        let (ready_tx, ready_rx) = oneshot::channel();

        std::thread::Builder::new()
            .name("sturdy-sqlite".into())
            .spawn(move || worker(path, worker_rx, ready_tx))
            .map_err(|e| Error::protocol(format!("failed to spawn sqlite worker: {e}")))?;

        ready_rx.await.map_err(|_| worker_gone())??;

        Ok(SqliteConnection { worker_tx })
    }

    fn send(&self, command: Command) -> Result<()> {
        self.worker_tx.send(command).map_err(|_| worker_gone())
    }
}

impl RawConnection for SqliteConnection {
    fn execute<'c>(
        &'c mut self,
        sql: &'c str,
        params: Vec<Value>,
    ) -> BoxFuture<'c, Result<ExecuteResult>> {
        let sql: Box<str> = sql.into();
        Box::pin(async move {
            let (reply, rx) = oneshot::channel();
            self.send(Command::Execute { sql, params, reply })?;
            rx.await.map_err(|_| worker_gone())?
        })
    }

    fn fetch_all<'c>(
        &'c mut self,
        sql: &'c str,
        params: Vec<Value>,
    ) -> BoxFuture<'c, Result<Vec<Row>>> {
        let sql: Box<str> = sql.into();
        Box::pin(async move {
            let (reply, rx) = oneshot::channel();
            self.send(Command::FetchAll { sql, params, reply })?;
            rx.await.map_err(|_| worker_gone())?
        })
    }

    fn fetch_stream<'c>(
        &'c mut self,
        sql: &'c str,
        params: Vec<Value>,
    ) -> BoxStream<'c, Result<Row>> {
        let (rows_tx, rows_rx) = flume::bounded(64);
        let sent = self.send(Command::Stream {
            sql: sql.into(),
            params,
            rows: rows_tx,
        });

        match sent {
            Ok(()) => Box::pin(rows_rx.into_stream()),
            Err(e) => Box::pin(futures_util::stream::once(async move { Err(e) })),
        }
    }

    fn ping(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let (reply, rx) = oneshot::channel();
            self.send(Command::Ping { reply })?;
            rx.await.map_err(|_| worker_gone())?
        })
    }

    fn rollback_unawaited(&mut self) {
        // enqueued ahead of any later command on this connection
        let _ = self.worker_tx.send(Command::Rollback);
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let _ = self.worker_tx.send(Command::Shutdown);
    }
}

pub(crate) fn open(path: &str) -> Result<rusqlite::Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;

    let conn = rusqlite::Connection::open_with_flags(path, flags).map_err(map_rusqlite_error)?;
    conn.busy_timeout(Duration::from_secs(5))
        .map_err(map_rusqlite_error)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(map_rusqlite_error)?;

    Ok(conn)
}

fn worker(
    path: String,
    commands: flume::Receiver<Command>,
    ready: oneshot::Sender<Result<()>>,
) {
    let conn = match open(&path) {
        Ok(conn) => {
            let _ = ready.send(Ok(()));
            conn
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    for command in commands.iter() {
        match command {
            Command::Execute { sql, params, reply } => {
                let _ = reply.send(run_execute(&conn, &sql, params));
            }
            Command::FetchAll { sql, params, reply } => {
                let _ = reply.send(run_fetch_all(&conn, &sql, params));
            }
            Command::Stream { sql, params, rows } => {
                run_stream(&conn, &sql, params, rows);
            }
            Command::Ping { reply } => {
                let outcome = conn
                    .query_row("SELECT 1", [], |_| Ok(()))
                    .map_err(map_rusqlite_error);
                let _ = reply.send(outcome);
            }
            Command::Rollback => {
                // a no-op error (no open transaction) is irrelevant here
                let _ = conn.execute_batch("ROLLBACK");
            }
            Command::Shutdown => break,
        }
    }
}

fn run_execute(conn: &rusqlite::Connection, sql: &str, params: Vec<Value>) -> Result<ExecuteResult> {
    let mut stmt = conn.prepare_cached(sql).map_err(map_rusqlite_error)?;
    let rows_affected = stmt
        .execute(rusqlite::params_from_iter(params.into_iter().map(encode)))
        .map_err(map_rusqlite_error)?;

    Ok(ExecuteResult {
        rows_affected: rows_affected as u64,
        last_insert_id: Some(conn.last_insert_rowid()),
    })
}

fn run_fetch_all(conn: &rusqlite::Connection, sql: &str, params: Vec<Value>) -> Result<Vec<Row>> {
    let mut stmt = conn.prepare_cached(sql).map_err(map_rusqlite_error)?;
    let meta = RowMeta::new(stmt.column_names().iter().map(|s| s.to_string()).collect());
    let column_count = stmt.column_count();

    let mut rows = stmt
        .query(rusqlite::params_from_iter(params.into_iter().map(encode)))
        .map_err(map_rusqlite_error)?;

    let mut out = Vec::new();
    loop {
        match rows.next() {
            Ok(Some(row)) => {
                let mut values = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    values.push(decode(row.get_ref(i).map_err(map_rusqlite_error)?)?);
                }
                out.push(Row::new(meta.clone(), values));
            }
            Ok(None) => break,
            Err(e) => return Err(map_rusqlite_error(e)),
        }
    }

    Ok(out)
}

fn run_stream(
    conn: &rusqlite::Connection,
    sql: &str,
    params: Vec<Value>,
    out: flume::Sender<Result<Row>>,
) {
    let mut stmt = match conn.prepare_cached(sql).map_err(map_rusqlite_error) {
        Ok(stmt) => stmt,
        Err(e) => {
            let _ = out.send(Err(e));
            return;
        }
    };

    let meta = RowMeta::new(stmt.column_names().iter().map(|s| s.to_string()).collect());
    let column_count = stmt.column_count();

    let mut rows = match stmt
        .query(rusqlite::params_from_iter(params.into_iter().map(encode)))
        .map_err(map_rusqlite_error)
    {
        Ok(rows) => rows,
        Err(e) => {
            let _ = out.send(Err(e));
            return;
        }
    };

    loop {
        match rows.next() {
            Ok(Some(row)) => {
                let mut values = Vec::with_capacity(column_count);
                let mut decoded = Ok(());
                for i in 0..column_count {
                    match row.get_ref(i).map_err(map_rusqlite_error).and_then(decode) {
                        Ok(value) => values.push(value),
                        Err(e) => {
                            decoded = Err(e);
                            break;
                        }
                    }
                }

                let item = decoded.map(|()| Row::new(meta.clone(), values));
                let failed = item.is_err();
                if out.send(item).is_err() || failed {
                    // receiver dropped mid-stream: stop stepping, the
                    // statement resets when `rows` goes out of scope
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                let _ = out.send(Err(map_rusqlite_error(e)));
                return;
            }
        }
    }
}

/// Lower an engine value into SQLite's storage classes.
fn encode(value: Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;

    match value {
        Value::Null => Sql::Null,
        Value::Bool(v) => Sql::Integer(v as i64),
        Value::Int(v) => Sql::Integer(v),
        Value::Double(v) => Sql::Real(v),
        Value::Decimal(v) => Sql::Text(v.to_string()),
        Value::Text(v) => Sql::Text(v),
        Value::Bytes(v) => Sql::Blob(v),
        Value::DateTime(v) => Sql::Text(v.format(DATETIME_FORMAT).to_string()),
        Value::DateTimeOffset(v) => Sql::Text(v.to_rfc3339()),
        Value::Interval(v) => Sql::Integer(v.num_microseconds().unwrap_or(i64::MAX)),
        Value::Guid(v) => Sql::Text(v.to_string()),
    }
}

/// Lift a SQLite cell into an engine value. Logical reinterpretation (text to
/// datetime, integer to bool, …) happens later, driven by entity metadata.
fn decode(value: rusqlite::types::ValueRef<'_>) -> Result<Value> {
    use rusqlite::types::ValueRef;

    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Int(v),
        ValueRef::Real(v) => Value::Double(v),
        ValueRef::Text(bytes) => Value::Text(
            std::str::from_utf8(bytes)
                .map_err(|_| Error::protocol("sqlite returned invalid utf-8 text"))?
                .to_owned(),
        ),
        ValueRef::Blob(bytes) => Value::Bytes(bytes.to_vec()),
    })
}
