//! Meta operations layered over the registry: `execute_code` and `get_type_schema`.

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use codemode_core::Result;
use codemode_governance::{track_tool_call, CallSurface};
use codemode_sandbox::{Evaluator, TypeCache};

use crate::mcp_adapter::{McpServer, McpToolResult};
use crate::registry::ToolRegistry;

pub const EXECUTE_CODE_DESCRIPTION: &str = "Execute JavaScript in a sandboxed isolate. \
The code has access to a `codemode` object with typed functions for all other tools.";

pub const TYPE_SCHEMA_DESCRIPTION: &str =
    "Get TypeScript type definitions for every tool callable through `codemode`.";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteCodeArgs {
    /// JavaScript code to execute in a sandboxed isolate. The code has access to a
    /// `codemode` object with typed functions for all other tools. The code should be
    /// a function body (not wrapped in a function). Use `return` to return a value.
    /// Example: `const rows = await codemode.sql_query({query: 'SELECT * FROM agents'}); return rows;`
    pub code: String,
}

/// Register the two meta operations on `server`.
///
/// Both read `registry` only through the evaluator and the type cache, so
/// they must be registered after the registry is complete.
pub fn register_meta_tools(
    server: &mut McpServer,
    registry: &ToolRegistry,
    evaluator: Arc<Evaluator>,
    types: Arc<TypeCache>,
) -> Result<()> {
    let schema = serde_json::to_value(schemars::schema_for!(ExecuteCodeArgs))?;
    server.tool(
        "execute_code",
        EXECUTE_CODE_DESCRIPTION,
        schema,
        move |input: Value| {
            let evaluator = evaluator.clone();
            async move {
                let code = match serde_json::from_value::<ExecuteCodeArgs>(input) {
                    Ok(args) => args.code,
                    Err(e) => return McpToolResult::error(format!("Invalid arguments: {}", e)),
                };
                let outcome = evaluator.execute(&code).await;
                track_tool_call(
                    CallSurface::Protocol,
                    "execute_code",
                    if outcome.is_success() { "ok" } else { "error" },
                );
                // Isolate failures are ordinary results here, never `isError`.
                McpToolResult::text(outcome.into_output().to_text())
            }
        },
    )?;

    let definitions = registry.definitions();
    server.tool(
        "get_type_schema",
        TYPE_SCHEMA_DESCRIPTION,
        json!({ "type": "object", "properties": {} }),
        move |_input: Value| {
            let types = types.clone();
            let definitions = definitions.clone();
            async move {
                track_tool_call(CallSurface::Protocol, "get_type_schema", "ok");
                McpToolResult::text(types.get_or_generate(|| definitions))
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::sql_tools;
    use codemode_core::mocks::{MockExecutionLog, MockSqlExecutor};
    use codemode_core::types::{ContextId, ToolContext};
    use codemode_sandbox::{IsolateOutcome, MockIsolateHost};

    fn registry() -> ToolRegistry {
        let mut registry =
            ToolRegistry::new(Arc::new(ToolContext::new(Arc::new(MockSqlExecutor::new()))));
        registry.add(sql_tools()).unwrap();
        registry
    }

    fn server_with(evaluator: Evaluator, types: Arc<TypeCache>) -> McpServer {
        let registry = registry();
        let mut server = McpServer::new("test", "0.0.0");
        register_meta_tools(&mut server, &registry, Arc::new(evaluator), types).unwrap();
        server
    }

    #[tokio::test]
    async fn test_type_schema_generated_once() {
        let types = Arc::new(TypeCache::new());
        let log = Arc::new(MockExecutionLog::new());
        let server = server_with(
            Evaluator::new(ContextId::from("ctx"), vec![], log),
            types.clone(),
        );

        let first = server.call("get_type_schema", json!({})).await.unwrap();
        let second = server.call("get_type_schema", json!({})).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(types.generations(), 1);

        let text = first.first_text().unwrap();
        assert!(text.contains("interface SqlQueryInput"));
        assert!(!text.contains("sql_tables"));
    }

    #[tokio::test]
    async fn test_execute_code_without_host_is_data() {
        let log = Arc::new(MockExecutionLog::new());
        let server = server_with(
            Evaluator::new(ContextId::from("ctx"), vec![], log.clone()),
            Arc::new(TypeCache::new()),
        );

        let result = server
            .call("execute_code", json!({ "code": "return 1;" }))
            .await
            .unwrap();
        assert!(!result.is_error());
        let payload: Value = serde_json::from_str(result.first_text().unwrap()).unwrap();
        assert!(payload["error"].as_str().unwrap().contains("Isolation host"));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_execute_code_failure_is_not_flagged() {
        let log = Arc::new(MockExecutionLog::new());
        let host = Arc::new(MockIsolateHost::returning(IsolateOutcome::raised("boom")));
        let evaluator = Evaluator::new(ContextId::from("ctx"), vec![], log.clone())
            .with_host(host)
            .with_proxy(Arc::new(codemode_sandbox::CallbackProxy::new()), "http://proxy");
        let server = server_with(evaluator, Arc::new(TypeCache::new()));

        let result = server
            .call("execute_code", json!({ "code": "throw new Error('boom')" }))
            .await
            .unwrap();
        assert!(!result.is_error());
        let payload: Value = serde_json::from_str(result.first_text().unwrap()).unwrap();
        assert_eq!(payload["error"], "boom");
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_execute_code_requires_code() {
        let log = Arc::new(MockExecutionLog::new());
        let server = server_with(
            Evaluator::new(ContextId::from("ctx"), vec![], log),
            Arc::new(TypeCache::new()),
        );
        let err = server.call("execute_code", json!({})).await.unwrap_err();
        assert_eq!(err.code, crate::mcp_adapter::INVALID_PARAMS);
    }
}
