//! Execution audit log.

use async_trait::async_trait;
use rusqlite::params;
use tokio::sync::RwLock;

use codemode_core::{traits::ExecutionLog, types::ExecutionRecord, Error, Result};

use crate::schema::initialize_schema;
use crate::sqlite::SqliteStore;

/// Execution log persisted in the `execution_log` table.
pub struct SqliteExecutionLog {
    store: SqliteStore,
}

impl SqliteExecutionLog {
    /// Wrap a store, creating the table if needed.
    pub async fn new(store: SqliteStore) -> Result<Self> {
        initialize_schema(&store).await?;
        Ok(Self { store })
    }
}

#[async_trait]
impl ExecutionLog for SqliteExecutionLog {
    async fn record(&self, code: &str, result: Option<String>, error: Option<String>) -> Result<()> {
        let code = code.to_string();
        self.store
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO execution_log (code, result, error) VALUES (?1, ?2, ?3)",
                    params![code, result, error],
                )
                .map_err(|e| Error::storage(format!("Insert error: {}", e)))?;
                Ok(())
            })
            .await
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ExecutionRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.store
            .with_conn(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, code, result, error, executed_at FROM execution_log
                         ORDER BY id DESC LIMIT ?1",
                    )
                    .map_err(|e| Error::storage(format!("Prepare error: {}", e)))?;
                let records = stmt
                    .query_map(params![limit], |row| {
                        Ok(ExecutionRecord {
                            id: row.get(0)?,
                            code: row.get(1)?,
                            result: row.get(2)?,
                            error: row.get(3)?,
                            executed_at: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                        })
                    })
                    .map_err(|e| Error::storage(format!("Query error: {}", e)))?
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| Error::storage(format!("Row error: {}", e)))?;
                Ok(records)
            })
            .await
    }
}

/// Volatile execution log for development and tests.
#[derive(Default)]
pub struct InMemoryExecutionLog {
    records: RwLock<Vec<ExecutionRecord>>,
}

impl InMemoryExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionLog for InMemoryExecutionLog {
    async fn record(&self, code: &str, result: Option<String>, error: Option<String>) -> Result<()> {
        let mut records = self.records.write().await;
        let id = records.len() as i64 + 1;
        records.push(ExecutionRecord {
            id,
            code: code.to_string(),
            result,
            error,
            executed_at: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        });
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ExecutionRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }
}
