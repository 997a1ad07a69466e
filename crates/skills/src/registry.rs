//! Tool registry.
//!
//! The single place tools are defined. Protocol registration, isolate call
//! routing and type generation all derive from the same entries, so the three
//! surfaces cannot drift apart.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use codemode_core::{
    traits::{IsolateCallTarget, ToolHandler},
    types::{ToolContext, ToolDefinition, ToolOutput},
    Error, Result,
};
use codemode_governance::{track_tool_call, CallSurface};

use crate::mcp_adapter::{McpServer, McpToolResult};

/// One tool: name, description, input schema, handler and visibility.
#[derive(Clone)]
pub struct ToolEntry {
    pub name: String,
    pub description: String,
    pub schema: Value,
    pub handler: Arc<dyn ToolHandler>,
    /// Callable only from inside an isolate.
    pub hidden: bool,
}

impl ToolEntry {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler: Arc::new(handler),
            hidden: false,
        }
    }

    /// Entry whose schema is derived from an argument type.
    pub fn with_args<A: JsonSchema>(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(A))
            .unwrap_or_else(|_| json!({ "type": "object" }));
        Self::new(name, description, schema, handler)
    }

    /// Keep this entry off the protocol surface.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

impl std::fmt::Debug for ToolEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolEntry")
            .field("name", &self.name)
            .field("hidden", &self.hidden)
            .finish_non_exhaustive()
    }
}

/// Ordered, name-indexed set of tool entries sharing one context.
pub struct ToolRegistry {
    tools: Vec<Arc<ToolEntry>>,
    by_name: HashMap<String, usize>,
    ctx: Arc<ToolContext>,
}

impl ToolRegistry {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self {
            tools: Vec::new(),
            by_name: HashMap::new(),
            ctx,
        }
    }

    /// Append entries in order.
    ///
    /// Fails without adding anything if any name is already taken, including
    /// by an earlier entry of the same batch.
    pub fn add(&mut self, entries: impl IntoIterator<Item = ToolEntry>) -> Result<()> {
        let entries: Vec<ToolEntry> = entries.into_iter().collect();
        let mut incoming: Vec<&str> = Vec::with_capacity(entries.len());
        for entry in &entries {
            if self.by_name.contains_key(&entry.name) || incoming.contains(&entry.name.as_str()) {
                return Err(Error::DuplicateTool(entry.name.clone()));
            }
            incoming.push(&entry.name);
        }

        for entry in entries {
            tracing::info!(tool = %entry.name, hidden = entry.hidden, "Registering tool");
            self.by_name.insert(entry.name.clone(), self.tools.len());
            self.tools.push(Arc::new(entry));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn context(&self) -> &Arc<ToolContext> {
        &self.ctx
    }

    /// Expose every visible entry as a protocol operation.
    pub fn register_all(&self, server: &mut McpServer) -> Result<()> {
        for entry in self.tools.iter().filter(|t| !t.hidden) {
            let entry = entry.clone();
            let ctx = self.ctx.clone();
            server.tool(
                entry.name.clone(),
                entry.description.clone(),
                entry.schema.clone(),
                move |input: Value| {
                    let entry = entry.clone();
                    let ctx = ctx.clone();
                    async move {
                        match entry.handler.call(input, ctx).await {
                            Ok(output) => {
                                track_tool_call(CallSurface::Protocol, &entry.name, "ok");
                                McpToolResult::text(output.to_text())
                            }
                            Err(e) => {
                                tracing::warn!(tool = %entry.name, error = %e, "Tool call failed");
                                track_tool_call(CallSurface::Protocol, &entry.name, "error");
                                McpToolResult::error(e.payload_message())
                            }
                        }
                    }
                },
            )?;
        }
        Ok(())
    }

    /// Resolve a call made from inside an isolate.
    ///
    /// Hidden entries are reachable. An unknown name yields an
    /// `{"error": "Unknown tool: <name>"}` value rather than an `Err`.
    pub async fn handle_isolate_call(
        &self,
        function_name: &str,
        args: Vec<Value>,
    ) -> Result<ToolOutput> {
        let Some(entry) = self.by_name.get(function_name).and_then(|i| self.tools.get(*i)) else {
            track_tool_call(CallSurface::Isolate, function_name, "unknown");
            return Ok(ToolOutput::value(json!({
                "error": Error::tool_not_found(function_name).to_string()
            })));
        };

        let input = match args.into_iter().next() {
            Some(Value::Null) | None => json!({}),
            Some(first) => first,
        };

        tracing::debug!(tool = %function_name, "Isolate tool call");
        let result = entry.handler.call(input, self.ctx.clone()).await;
        track_tool_call(
            CallSurface::Isolate,
            function_name,
            if result.is_ok() { "ok" } else { "error" },
        );
        result
    }

    /// Visible entries, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .filter(|t| !t.hidden)
            .map(|t| ToolDefinition {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.schema.clone(),
            })
            .collect()
    }

    /// Every entry name, hidden ones included, in registration order.
    pub fn callable_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name.clone()).collect()
    }
}

#[async_trait]
impl IsolateCallTarget for ToolRegistry {
    async fn call_tool(&self, function_name: &str, args: Vec<Value>) -> Result<ToolOutput> {
        self.handle_isolate_call(function_name, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codemode_core::mocks::MockSqlExecutor;

    fn ctx() -> Arc<ToolContext> {
        Arc::new(ToolContext::new(Arc::new(MockSqlExecutor::new())))
    }

    async fn echo(input: Value, _ctx: Arc<ToolContext>) -> Result<ToolOutput> {
        Ok(ToolOutput::value(input))
    }

    async fn nothing(_input: Value, _ctx: Arc<ToolContext>) -> Result<ToolOutput> {
        Ok(ToolOutput::Nothing)
    }

    async fn fail(_input: Value, _ctx: Arc<ToolContext>) -> Result<ToolOutput> {
        Err(Error::tool_execution("handler exploded"))
    }

    fn schema() -> Value {
        json!({ "type": "object" })
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new(ctx());
        registry
            .add([
                ToolEntry::new("echo", "Echo input", schema(), echo),
                ToolEntry::new("secret", "Hidden echo", schema(), echo).hidden(),
                ToolEntry::new("nothing", "Returns nothing", schema(), nothing),
                ToolEntry::new("fail", "Always fails", schema(), fail),
            ])
            .unwrap();
        registry
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut registry = registry();
        let err = registry
            .add([ToolEntry::new("echo", "again", schema(), echo)])
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateTool(name) if name == "echo"));

        let mut fresh = ToolRegistry::new(ctx());
        let err = fresh
            .add([
                ToolEntry::new("a", "", schema(), echo),
                ToolEntry::new("a", "", schema(), echo),
            ])
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateTool(_)));
        assert!(fresh.is_empty());
    }

    #[test]
    fn test_definitions_exclude_hidden_and_keep_order() {
        let names: Vec<String> = registry().definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["echo", "nothing", "fail"]);
        assert_eq!(
            registry().callable_names(),
            vec!["echo", "secret", "nothing", "fail"]
        );
    }

    #[tokio::test]
    async fn test_isolate_call_reaches_hidden_and_defaults_input() {
        let registry = registry();
        let out = registry
            .handle_isolate_call("secret", vec![json!({ "x": 1 })])
            .await
            .unwrap();
        assert_eq!(out, ToolOutput::value(json!({ "x": 1 })));

        let out = registry.handle_isolate_call("echo", vec![]).await.unwrap();
        assert_eq!(out, ToolOutput::value(json!({})));
    }

    #[tokio::test]
    async fn test_isolate_call_unknown_tool_is_data() {
        let out = registry().handle_isolate_call("nope", vec![]).await.unwrap();
        assert_eq!(out, ToolOutput::value(json!({ "error": "Unknown tool: nope" })));
    }

    #[tokio::test]
    async fn test_isolate_call_returns_raw_error() {
        let err = registry().handle_isolate_call("fail", vec![]).await.unwrap_err();
        assert_eq!(err.payload_message(), "handler exploded");
    }

    #[tokio::test]
    async fn test_register_all_wraps_results() {
        let registry = registry();
        let mut server = McpServer::new("test", "0.0.0");
        registry.register_all(&mut server).unwrap();

        let names: Vec<String> = server.tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["echo", "nothing", "fail"]);

        let ok = server.call("echo", json!({ "a": [1, 2] })).await.unwrap();
        assert_eq!(ok.first_text(), Some(r#"{"a":[1,2]}"#));
        assert!(!ok.is_error());

        let none = server.call("nothing", json!({})).await.unwrap();
        assert_eq!(none.first_text(), Some("undefined"));

        let failed = server.call("fail", json!({})).await.unwrap();
        assert!(failed.is_error());
        assert_eq!(failed.first_text(), Some(r#"{"error":"handler exploded"}"#));

        assert!(server.call("secret", json!({})).await.is_err());
    }
}
