//! SQLite-backed statement executor.

use async_trait::async_trait;
use rusqlite::types::{Value as DbValue, ValueRef};
use rusqlite::{params_from_iter, Batch, Connection, Statement};
use serde_json::{Map, Number, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

use codemode_core::{
    sql_policy,
    traits::{SqlExecutor, SqlStatement},
    types::{SqlRow, SqlValue},
    Error, Result,
};

/// Statement executor over one SQLite connection.
///
/// The connection sits behind an async mutex and every statement runs on the
/// blocking pool, so writes are applied in the order their lock was taken.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    pub(crate) schema_ready: Arc<OnceCell<()>>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::storage(format!("DB error: {}", e)))?;
        Ok(Self::from_connection(conn))
    }

    /// A private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| Error::storage(format!("DB error: {}", e)))?;
        Ok(Self::from_connection(conn))
    }

    /// Open `path`, treating `:memory:` as an in-memory database.
    pub fn open_configured(path: &str) -> Result<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::open(path)
        }
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    /// Run a closure against the connection on the blocking pool.
    pub(crate) async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| Error::internal(e.to_string()))?
    }
}

fn check_params(statement: &str, params: &[SqlValue]) -> Result<()> {
    let expected = sql_policy::count_placeholders(statement);
    if expected != params.len() {
        return Err(Error::ParameterMismatch {
            expected,
            actual: params.len(),
        });
    }
    Ok(())
}

fn to_db_value(value: &SqlValue) -> DbValue {
    match value {
        SqlValue::Null => DbValue::Null,
        SqlValue::Bool(b) => DbValue::Integer(i64::from(*b)),
        SqlValue::Integer(n) => DbValue::Integer(*n),
        SqlValue::Real(f) => DbValue::Real(*f),
        SqlValue::Text(s) => DbValue::Text(s.clone()),
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Number(n.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Array(b.iter().map(|byte| Value::from(*byte)).collect()),
    }
}

/// Message for text that holds more than one statement.
pub const SINGLE_STATEMENT_MESSAGE: &str =
    "Only one statement per call is allowed; use sql_exec_batch for several statements";

/// Compile exactly one statement, rejecting any non-empty tail.
fn prepare_single<'conn>(conn: &'conn Connection, statement: &str) -> Result<Option<Statement<'conn>>> {
    let mut batch = Batch::new(conn, statement);
    let Some(stmt) = batch.next().map_err(|e| Error::storage(e.to_string()))? else {
        return Ok(None);
    };
    match batch.next() {
        Ok(None) => Ok(Some(stmt)),
        Ok(Some(_)) | Err(_) => Err(Error::statement_rejected(SINGLE_STATEMENT_MESSAGE)),
    }
}

fn run_statement(conn: &Connection, statement: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>> {
    let Some(mut stmt) = prepare_single(conn, statement)? else {
        return Ok(Vec::new());
    };
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt
        .query(params_from_iter(params.iter().map(to_db_value)))
        .map_err(|e| Error::storage(e.to_string()))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(|e| Error::storage(e.to_string()))? {
        let mut obj = Map::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            let value = row.get_ref(i).map_err(|e| Error::storage(e.to_string()))?;
            obj.insert(name.clone(), to_json(value));
        }
        out.push(obj);
    }
    Ok(out)
}

#[async_trait]
impl SqlExecutor for SqliteStore {
    async fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        check_params(statement, params)?;

        let statement = statement.to_string();
        let params = params.to_vec();
        let rows = self
            .with_conn(move |conn| run_statement(conn, &statement, &params))
            .await?;
        tracing::debug!(rows = rows.len(), "Statement executed");
        Ok(rows)
    }

    async fn execute_batch(&self, statements: Vec<SqlStatement>) -> Result<Vec<Vec<SqlRow>>> {
        // Every statement is checked before the transaction opens.
        for (statement, params) in &statements {
            check_params(statement, params)?;
        }

        let count = statements.len();
        let results = self
            .with_conn(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(|e| Error::storage(e.to_string()))?;
                let mut results = Vec::with_capacity(statements.len());
                for (statement, params) in &statements {
                    results.push(run_statement(&tx, statement, params)?);
                }
                tx.commit().map_err(|e| Error::storage(e.to_string()))?;
                Ok(results)
            })
            .await?;
        tracing::debug!(statements = count, "Batch committed");
        Ok(results)
    }
}
