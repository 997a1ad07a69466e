//! Built-in SQL tools.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use codemode_core::{
    types::{SqlValue, ToolContext, ToolOutput},
    Error, Result,
};

use crate::registry::ToolEntry;

const READ_ONLY_MESSAGE: &str =
    "sql_query only allows SELECT, PRAGMA, and EXPLAIN statements. Use sql_exec for DDL/DML.";
const BLOCKED_MESSAGE: &str = "ATTACH, DETACH, and LOAD_EXTENSION statements are not allowed.";
const PROTECTED_MESSAGE: &str = "execution_log is read-only. Query it with sql_query.";

/// Reason a write statement is refused, if it is.
fn write_rejection(ctx: &ToolContext, statement: &str) -> Option<&'static str> {
    if ctx.is_blocked(statement) {
        Some(BLOCKED_MESSAGE)
    } else if ctx.touches_protected(statement) {
        Some(PROTECTED_MESSAGE)
    } else {
        None
    }
}

pub(crate) fn parse_args<T: DeserializeOwned>(input: Value) -> Result<T> {
    serde_json::from_value(input).map_err(|e| Error::tool_execution(format!("Invalid arguments: {}", e)))
}

// =============================================================================
// sql_query
// =============================================================================

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SqlQueryArgs {
    /// SQL SELECT query to execute. Only SELECT, PRAGMA, and EXPLAIN statements are allowed.
    pub query: String,
    /// Optional query parameters for parameterized queries
    #[serde(default)]
    pub params: Option<Vec<SqlValue>>,
}

async fn sql_query(input: Value, ctx: Arc<ToolContext>) -> Result<ToolOutput> {
    let args: SqlQueryArgs = parse_args(input)?;
    if !ctx.is_read_only(&args.query) {
        return Err(Error::statement_rejected(READ_ONLY_MESSAGE));
    }
    let rows = ctx
        .sql()
        .execute(&args.query, args.params.as_deref().unwrap_or_default())
        .await?;
    ToolOutput::json(&rows)
}

// =============================================================================
// sql_exec
// =============================================================================

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SqlExecArgs {
    /// A single SQL DDL/DML statement to execute (CREATE TABLE, INSERT, UPDATE, DELETE, etc). ATTACH, DETACH, and LOAD_EXTENSION are blocked, and execution_log is read-only.
    pub query: String,
    /// Optional query parameters for parameterized queries
    #[serde(default)]
    pub params: Option<Vec<SqlValue>>,
}

async fn sql_exec(input: Value, ctx: Arc<ToolContext>) -> Result<ToolOutput> {
    let args: SqlExecArgs = parse_args(input)?;
    if let Some(reason) = write_rejection(&ctx, &args.query) {
        return Err(Error::statement_rejected(reason));
    }
    let rows = ctx
        .sql()
        .execute(&args.query, args.params.as_deref().unwrap_or_default())
        .await?;
    Ok(ToolOutput::value(json!({ "success": true, "result": rows })))
}

// =============================================================================
// sql_exec_batch
// =============================================================================

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SqlExecBatchArgs {
    /// Statements to run in order inside one transaction. If any fails, none are applied.
    #[schemars(length(min = 1))]
    pub statements: Vec<SqlExecArgs>,
}

async fn sql_exec_batch(input: Value, ctx: Arc<ToolContext>) -> Result<ToolOutput> {
    let args: SqlExecBatchArgs = parse_args(input)?;
    let rejected = args
        .statements
        .iter()
        .enumerate()
        .find_map(|(i, s)| write_rejection(&ctx, &s.query).map(|reason| (i, reason)));
    if let Some((index, reason)) = rejected {
        return Err(Error::statement_rejected(format!(
            "Statement {}: {}",
            index + 1,
            reason
        )));
    }
    let statements = args
        .statements
        .into_iter()
        .map(|s| (s.query, s.params.unwrap_or_default()))
        .collect();
    let results = ctx.sql().execute_batch(statements).await?;
    Ok(ToolOutput::value(json!({ "success": true, "results": results })))
}

// =============================================================================
// sql_tables (isolate only)
// =============================================================================

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SqlTablesArgs {}

async fn sql_tables(_input: Value, ctx: Arc<ToolContext>) -> Result<ToolOutput> {
    let tables = ctx
        .sql()
        .execute(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            &[],
        )
        .await?;

    let mut out = Vec::with_capacity(tables.len());
    for table in tables {
        let Some(name) = table.get("name").and_then(Value::as_str).map(String::from) else {
            continue;
        };
        let columns = ctx
            .sql()
            .execute(
                "SELECT name, type, \"notnull\" AS not_null, pk FROM pragma_table_info(?)",
                &[SqlValue::Text(name.clone())],
            )
            .await?;
        out.push(json!({ "table": name, "columns": columns }));
    }
    Ok(ToolOutput::value(Value::Array(out)))
}

/// The SQL tool set, in registration order.
pub fn sql_tools() -> Vec<ToolEntry> {
    vec![
        ToolEntry::with_args::<SqlQueryArgs>(
            "sql_query",
            "Execute SELECT queries against SQLite. Returns rows as JSON.",
            sql_query,
        ),
        ToolEntry::with_args::<SqlExecArgs>(
            "sql_exec",
            "Execute DDL/DML statements (CREATE TABLE, INSERT, UPDATE, DELETE).",
            sql_exec,
        ),
        ToolEntry::with_args::<SqlExecBatchArgs>(
            "sql_exec_batch",
            "Execute multiple DDL/DML statements atomically in one call.",
            sql_exec_batch,
        ),
        ToolEntry::with_args::<SqlTablesArgs>(
            "sql_tables",
            "List tables and their columns.",
            sql_tables,
        )
        .hidden(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use codemode_core::mocks::MockSqlExecutor;
    use serde_json::Map;

    fn ctx_with(sql: Arc<MockSqlExecutor>) -> Arc<ToolContext> {
        Arc::new(ToolContext::new(sql))
    }

    #[tokio::test]
    async fn test_sql_query_rejects_writes_before_store() {
        let sql = Arc::new(MockSqlExecutor::new());
        let err = sql_query(json!({ "query": "DELETE FROM t" }), ctx_with(sql.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.payload_message(), READ_ONLY_MESSAGE);
        assert!(sql.statements().is_empty());
    }

    #[tokio::test]
    async fn test_sql_query_passes_params() {
        let mut row = Map::new();
        row.insert("n".into(), json!(1));
        let sql = Arc::new(MockSqlExecutor::with_rows(vec![row]));
        let out = sql_query(
            json!({ "query": "SELECT ? AS n", "params": [1] }),
            ctx_with(sql.clone()),
        )
        .await
        .unwrap();
        assert_eq!(out.to_text(), r#"[{"n":1}]"#);
        assert_eq!(sql.statements()[0].1, vec![SqlValue::Integer(1)]);
    }

    #[tokio::test]
    async fn test_sql_exec_blocks_attach() {
        let sql = Arc::new(MockSqlExecutor::new());
        let err = sql_exec(
            json!({ "query": "DROP TABLE t; ATTACH DATABASE 'x' AS y" }),
            ctx_with(sql.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.payload_message(), BLOCKED_MESSAGE);
        assert!(sql.statements().is_empty());
    }

    #[tokio::test]
    async fn test_sql_exec_result_shape() {
        let sql = Arc::new(MockSqlExecutor::new());
        let out = sql_exec(
            json!({ "query": "INSERT INTO t VALUES (?)", "params": ["a"] }),
            ctx_with(sql),
        )
        .await
        .unwrap();
        assert_eq!(out.to_text(), r#"{"result":[],"success":true}"#);
    }

    #[tokio::test]
    async fn test_batch_rejects_blocked_statement_up_front() {
        let sql = Arc::new(MockSqlExecutor::new());
        let err = sql_exec_batch(
            json!({ "statements": [
                { "query": "INSERT INTO t VALUES (1)" },
                { "query": "DETACH DATABASE y" }
            ]}),
            ctx_with(sql.clone()),
        )
        .await
        .unwrap_err();
        assert!(err.payload_message().starts_with("Statement 2:"));
        assert!(sql.statements().is_empty());
    }

    #[tokio::test]
    async fn test_sql_exec_refuses_execution_log_writes() {
        let sql = Arc::new(MockSqlExecutor::new());
        let err = sql_exec(json!({ "query": "DELETE FROM execution_log" }), ctx_with(sql.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StatementRejected(_)));
        assert_eq!(err.payload_message(), PROTECTED_MESSAGE);
        assert!(sql.statements().is_empty());
    }

    #[tokio::test]
    async fn test_batch_refuses_execution_log_writes() {
        let sql = Arc::new(MockSqlExecutor::new());
        let err = sql_exec_batch(
            json!({ "statements": [
                { "query": "INSERT INTO t VALUES (1)" },
                { "query": "DROP TABLE execution_log" }
            ]}),
            ctx_with(sql.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.payload_message(), format!("Statement 2: {}", PROTECTED_MESSAGE));
        assert!(sql.statements().is_empty());
    }

    #[tokio::test]
    async fn test_sql_query_may_read_execution_log() {
        let sql = Arc::new(MockSqlExecutor::new());
        sql_query(
            json!({ "query": "SELECT COUNT(*) AS n FROM execution_log" }),
            ctx_with(sql.clone()),
        )
        .await
        .unwrap();
        assert_eq!(sql.statements().len(), 1);
    }

    #[test]
    fn test_schemas_describe_fields() {
        let tools = sql_tools();
        let query = &tools[0].schema["properties"]["query"];
        assert!(query["description"].as_str().unwrap().contains("SELECT"));
        assert_eq!(tools[0].schema["required"], json!(["query"]));
        assert!(tools[3].hidden);
    }
}
