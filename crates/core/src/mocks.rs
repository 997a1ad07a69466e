//! Mock implementations of core traits for testing.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::{
    sql_policy,
    traits::{ExecutionLog, SqlExecutor, SqlStatement},
    types::{ExecutionRecord, SqlRow, SqlValue},
    Error, Result,
};

// =============================================================================
// Mock SQL Executor
// =============================================================================

/// Records every statement and answers with canned rows.
#[derive(Default)]
pub struct MockSqlExecutor {
    rows: Vec<SqlRow>,
    statements: Mutex<Vec<SqlStatement>>,
    fail_with: Option<String>,
}

impl MockSqlExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every statement with these rows.
    pub fn with_rows(rows: Vec<SqlRow>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// Fail every statement with a storage error.
    pub fn failing(msg: &str) -> Self {
        Self {
            fail_with: Some(msg.to_string()),
            ..Self::default()
        }
    }

    /// Statements seen so far, in order.
    pub fn statements(&self) -> Vec<SqlStatement> {
        self.statements
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn check(statement: &str, params: &[SqlValue]) -> Result<()> {
        let expected = sql_policy::count_placeholders(statement);
        if expected != params.len() {
            return Err(Error::ParameterMismatch {
                expected,
                actual: params.len(),
            });
        }
        Ok(())
    }

    fn push(&self, statement: &str, params: &[SqlValue]) {
        if let Ok(mut s) = self.statements.lock() {
            s.push((statement.to_string(), params.to_vec()));
        }
    }
}

#[async_trait]
impl SqlExecutor for MockSqlExecutor {
    async fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        Self::check(statement, params)?;
        if let Some(msg) = &self.fail_with {
            return Err(Error::storage(msg.clone()));
        }
        self.push(statement, params);
        Ok(self.rows.clone())
    }

    async fn execute_batch(&self, statements: Vec<SqlStatement>) -> Result<Vec<Vec<SqlRow>>> {
        for (statement, params) in &statements {
            Self::check(statement, params)?;
        }
        if let Some(msg) = &self.fail_with {
            return Err(Error::storage(msg.clone()));
        }
        let mut out = Vec::with_capacity(statements.len());
        for (statement, params) in &statements {
            self.push(statement, params);
            out.push(self.rows.clone());
        }
        Ok(out)
    }
}

// =============================================================================
// Mock Execution Log
// =============================================================================

/// Keeps execution records in memory, optionally refusing writes.
#[derive(Default)]
pub struct MockExecutionLog {
    records: Mutex<Vec<ExecutionRecord>>,
    reject_writes: bool,
}

impl MockExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A log whose writes always fail.
    pub fn rejecting() -> Self {
        Self {
            reject_writes: true,
            ..Self::default()
        }
    }

    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ExecutionLog for MockExecutionLog {
    async fn record(&self, code: &str, result: Option<String>, error: Option<String>) -> Result<()> {
        if self.reject_writes {
            return Err(Error::storage("execution log is read-only"));
        }
        let mut records = self
            .records
            .lock()
            .map_err(|_| Error::internal("execution log lock poisoned"))?;
        let id = records.len() as i64 + 1;
        records.push(ExecutionRecord {
            id,
            code: code.to_string(),
            result,
            error,
            executed_at: String::new(),
        });
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<ExecutionRecord>> {
        let mut records = self.records();
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_sql_rejects_mismatch_without_recording() {
        let sql = MockSqlExecutor::new();
        let err = sql.execute("SELECT ? , ?", &[SqlValue::Integer(1)]).await.unwrap_err();
        assert!(matches!(err, Error::ParameterMismatch { expected: 2, actual: 1 }));
        assert!(sql.statements().is_empty());
    }

    #[tokio::test]
    async fn test_mock_log_newest_first() {
        let log = MockExecutionLog::new();
        log.record("a", Some("1".into()), None).await.unwrap();
        log.record("b", None, Some("boom".into())).await.unwrap();
        let recent = log.recent(1).await.unwrap();
        assert_eq!(recent[0].code, "b");
        assert_eq!(log.len(), 2);
    }
}
