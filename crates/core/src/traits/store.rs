//! Store-layer traits.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ExecutionRecord, SqlRow, SqlValue};

/// A single statement with its positional parameters.
pub type SqlStatement = (String, Vec<SqlValue>);

/// Parameterized statement execution against the relational store.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run one statement and return every produced row.
    ///
    /// Fails with [`crate::Error::ParameterMismatch`] before touching the store
    /// when the number of `?` placeholders differs from `params.len()`.
    async fn execute(&self, statement: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>>;

    /// Run statements in order inside one transaction. Nothing is applied
    /// unless all of them succeed.
    async fn execute_batch(&self, statements: Vec<SqlStatement>) -> Result<Vec<Vec<SqlRow>>>;
}

/// Append-only audit log of code executions.
#[async_trait]
pub trait ExecutionLog: Send + Sync {
    async fn record(
        &self,
        code: &str,
        result: Option<String>,
        error: Option<String>,
    ) -> Result<()>;

    /// Most recent records, newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<ExecutionRecord>>;
}
