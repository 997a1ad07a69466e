//! One tool-server instance: registry, protocol server and evaluator bound
//! to a single context id.

use std::sync::Arc;
use tokio::sync::OnceCell;

use codemode_core::{
    traits::{ExecutionLog, IsolateCallTarget, SqlExecutor},
    types::{ContextId, ToolContext},
    Result,
};
use codemode_sandbox::{CallbackProxy, Evaluator, IsolateHost, TypeCache};

use crate::builtin::sql_tools;
use crate::mcp_adapter::{JsonRpcRequest, JsonRpcResponse, McpServer};
use crate::meta::register_meta_tools;
use crate::network::{weather_tool, WeatherClient};
use crate::registry::ToolRegistry;

pub const SERVER_NAME: &str = "Code Mode MCP Server";
pub const SERVER_VERSION: &str = "1.0.0";

/// Optional capabilities wired into an agent.
#[derive(Default)]
pub struct AgentOptions {
    pub host: Option<Arc<dyn IsolateHost>>,
    /// Proxy plus the base URL isolates reach it on.
    pub proxy: Option<(Arc<CallbackProxy>, String)>,
    pub weather: Option<Arc<WeatherClient>>,
}

struct AgentState {
    server: McpServer,
    registry: Arc<ToolRegistry>,
}

pub struct CodeModeAgent {
    do_id: ContextId,
    sql: Arc<dyn SqlExecutor>,
    log: Arc<dyn ExecutionLog>,
    options: AgentOptions,
    types: Arc<TypeCache>,
    state: OnceCell<AgentState>,
}

impl CodeModeAgent {
    pub fn new(
        sql: Arc<dyn SqlExecutor>,
        log: Arc<dyn ExecutionLog>,
        options: AgentOptions,
    ) -> Self {
        Self {
            do_id: ContextId::generate(),
            sql,
            log,
            options,
            types: Arc::new(TypeCache::new()),
            state: OnceCell::new(),
        }
    }

    pub fn do_id(&self) -> &ContextId {
        &self.do_id
    }

    /// Build the registry and register every operation. Runs at most once;
    /// later calls are no-ops.
    pub async fn init(&self) -> Result<()> {
        self.state().await.map(|_| ())
    }

    async fn state(&self) -> Result<&AgentState> {
        self.state.get_or_try_init(|| async { self.build() }).await
    }

    fn build(&self) -> Result<AgentState> {
        let ctx = Arc::new(ToolContext::new(self.sql.clone()));
        let mut registry = ToolRegistry::new(ctx);
        registry.add(sql_tools())?;
        if let Some(weather) = &self.options.weather {
            registry.add([weather_tool(weather.clone())])?;
        }
        let registry = Arc::new(registry);

        let mut server = McpServer::new(SERVER_NAME, SERVER_VERSION);
        registry.register_all(&mut server)?;

        let mut evaluator = Evaluator::new(
            self.do_id.clone(),
            registry.callable_names(),
            self.log.clone(),
        );
        if let Some(host) = &self.options.host {
            evaluator = evaluator.with_host(host.clone());
        }
        if let Some((proxy, endpoint)) = &self.options.proxy {
            proxy.register_context(
                self.do_id.clone(),
                registry.clone() as Arc<dyn IsolateCallTarget>,
            );
            evaluator = evaluator.with_proxy(proxy.clone(), endpoint.clone());
        }
        register_meta_tools(&mut server, &registry, Arc::new(evaluator), self.types.clone())?;

        tracing::info!(
            do_id = %self.do_id,
            tools = server.tools().len(),
            "Agent initialized"
        );
        Ok(AgentState { server, registry })
    }

    /// Dispatch one protocol message, initializing on first use.
    pub async fn handle(&self, request: JsonRpcRequest) -> Result<Option<JsonRpcResponse>> {
        let state = self.state().await?;
        Ok(state.server.handle(request).await)
    }

    /// The tool registry, once initialized.
    pub fn registry(&self) -> Option<&Arc<ToolRegistry>> {
        self.state.get().map(|s| &s.registry)
    }
}

impl Drop for CodeModeAgent {
    fn drop(&mut self) {
        if let Some((proxy, _)) = &self.options.proxy {
            proxy.unregister_context(&self.do_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codemode_core::mocks::{MockExecutionLog, MockSqlExecutor};
    use serde_json::{json, Value};

    fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
        serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .unwrap()
    }

    fn agent(options: AgentOptions) -> CodeModeAgent {
        CodeModeAgent::new(
            Arc::new(MockSqlExecutor::new()),
            Arc::new(MockExecutionLog::new()),
            options,
        )
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let agent = agent(AgentOptions::default());
        agent.init().await.unwrap();
        agent.init().await.unwrap();
        assert_eq!(agent.registry().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_tools_list_includes_meta_operations() {
        let agent = agent(AgentOptions::default());
        let response = agent
            .handle(request(1, "tools/list", json!({})))
            .await
            .unwrap()
            .unwrap();
        let result = response.result.unwrap();
        let names: Vec<&str> = result["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(
            names,
            vec!["sql_query", "sql_exec", "sql_exec_batch", "execute_code", "get_type_schema"]
        );
    }

    #[tokio::test]
    async fn test_proxy_context_registered_and_released() {
        let proxy = Arc::new(CallbackProxy::new());
        let agent = agent(AgentOptions {
            proxy: Some((proxy.clone(), "http://127.0.0.1:8787".into())),
            ..AgentOptions::default()
        });
        agent.init().await.unwrap();
        let do_id = agent.do_id().clone();

        let out = proxy
            .invoke(codemode_core::types::ProxyCall {
                do_id: do_id.clone(),
                function_name: "missing".into(),
                args: vec![],
            })
            .await
            .unwrap();
        assert_eq!(out.into_value().unwrap()["error"], "Unknown tool: missing");

        drop(agent);
        let err = proxy
            .invoke(codemode_core::types::ProxyCall {
                do_id,
                function_name: "sql_query".into(),
                args: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, codemode_core::Error::ProxyRouting(_)));
    }
}
