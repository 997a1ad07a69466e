//! Platform schema bootstrap.

use codemode_core::{Error, Result};

use crate::sqlite::SqliteStore;

const EXECUTION_LOG_DDL: &str = "CREATE TABLE IF NOT EXISTS execution_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL,
    result TEXT,
    error TEXT,
    executed_at TEXT DEFAULT CURRENT_TIMESTAMP
)";

/// Ensure the platform tables exist.
///
/// Runs the DDL at most once per store; later calls return immediately.
pub async fn initialize_schema(store: &SqliteStore) -> Result<()> {
    let ready = store.schema_ready.clone();
    ready
        .get_or_try_init(|| async {
            store
                .with_conn(|conn| {
                    conn.execute_batch(EXECUTION_LOG_DDL)
                        .map_err(|e| Error::storage(format!("Schema error: {}", e)))
                })
                .await?;
            tracing::info!("Execution log schema initialized");
            Ok::<(), Error>(())
        })
        .await?;
    Ok(())
}
