use std::sync::Arc;

use crate::sql_policy;
use crate::traits::SqlExecutor;

/// Capabilities handed to every tool handler.
///
/// Built once per server and shared by all handlers. Handlers reach the
/// store only through this object.
#[derive(Clone)]
pub struct ToolContext {
    sql: Arc<dyn SqlExecutor>,
}

impl ToolContext {
    pub fn new(sql: Arc<dyn SqlExecutor>) -> Self {
        Self { sql }
    }

    /// Parameterized statement execution.
    pub fn sql(&self) -> &dyn SqlExecutor {
        self.sql.as_ref()
    }

    pub fn is_read_only(&self, statement: &str) -> bool {
        sql_policy::is_read_only(statement)
    }

    pub fn is_blocked(&self, statement: &str) -> bool {
        sql_policy::is_blocked(statement)
    }

    pub fn touches_protected(&self, statement: &str) -> bool {
        sql_policy::touches_protected(statement)
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext").finish_non_exhaustive()
    }
}
