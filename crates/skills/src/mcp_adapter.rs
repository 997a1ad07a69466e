//! MCP (Model Context Protocol) server adapter.
//!
//! Speaks JSON-RPC 2.0 and exposes registered operations as MCP tools. Input
//! is validated against each operation's JSON Schema before its handler runs;
//! handler failures come back as `isError` results, never as JSON-RPC errors.

use futures::future::BoxFuture;
use futures::FutureExt;
use jsonschema::{Draft, JSONSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use codemode_core::{Error, Result};

/// Protocol revision reported when the client does not ask for one.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

// JSON-RPC error codes
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    /// Absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl McpToolResult {
    /// Successful result carrying one text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent {
                content_type: "text".to_string(),
                text: text.into(),
            }],
            is_error: None,
        }
    }

    /// Failed result whose text is `{"error": message}`.
    pub fn error(message: impl Into<String>) -> Self {
        let mut result = Self::text(json!({ "error": message.into() }).to_string());
        result.is_error = Some(true);
        result
    }

    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }

    /// Text of the first content block.
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().map(|c| c.text.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

// =============================================================================
// Server
// =============================================================================

type OperationFn = Arc<dyn Fn(Value) -> BoxFuture<'static, McpToolResult> + Send + Sync>;

struct Operation {
    tool: McpTool,
    validator: JSONSchema,
    handler: OperationFn,
}

/// JSON-RPC front end over a set of named operations.
pub struct McpServer {
    info: ServerInfo,
    operations: Vec<Operation>,
    index: HashMap<String, usize>,
}

impl McpServer {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: ServerInfo {
                name: name.into(),
                version: version.into(),
            },
            operations: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register an operation. Names are unique and the schema must compile.
    pub fn tool<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Result<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = McpToolResult> + Send + 'static,
    {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(Error::DuplicateTool(name));
        }

        let validator = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&input_schema)
            .map_err(|e| Error::InvalidConfig(format!("Invalid schema for tool '{}': {}", name, e)))?;

        tracing::debug!(tool = %name, "Registering protocol operation");
        self.index.insert(name.clone(), self.operations.len());
        self.operations.push(Operation {
            tool: McpTool {
                name,
                description: description.into(),
                input_schema,
            },
            validator,
            handler: Arc::new(move |input| handler(input).boxed()),
        });
        Ok(())
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Registered operations, in registration order.
    pub fn tools(&self) -> Vec<McpTool> {
        self.operations.iter().map(|op| op.tool.clone()).collect()
    }

    /// Validate `arguments` and run the named operation.
    pub async fn call(
        &self,
        name: &str,
        arguments: Value,
    ) -> std::result::Result<McpToolResult, JsonRpcError> {
        let op = self
            .index
            .get(name)
            .and_then(|i| self.operations.get(*i))
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown tool: {}", name)))?;

        if let Err(errors) = op.validator.validate(&arguments) {
            let messages: Vec<String> = errors
                .map(|e| format!("{}: {}", e.instance_path, e))
                .collect();
            return Err(JsonRpcError::invalid_params(format!(
                "Invalid arguments for tool {}: {}",
                name,
                messages.join("; ")
            )));
        }

        Ok((op.handler)(arguments).await)
    }

    /// Dispatch one JSON-RPC message. Notifications produce no response.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id.clone() else {
            tracing::debug!(method = %request.method, "Notification received");
            return None;
        };

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::failure(
                id,
                JsonRpcError::new(INVALID_REQUEST, "jsonrpc must be \"2.0\""),
            ));
        }

        let outcome = match request.method.as_str() {
            "initialize" => Ok(self.initialize_result(&request.params)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.tools() })),
            "tools/call" => self.handle_call(request.params).await,
            other => Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            )),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        })
    }

    fn initialize_result(&self, params: &Value) -> Value {
        let version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION);
        json!({
            "protocolVersion": version,
            "serverInfo": self.info,
            "capabilities": { "tools": { "listChanged": false } },
        })
    }

    async fn handle_call(&self, params: Value) -> std::result::Result<Value, JsonRpcError> {
        let params: CallParams = serde_json::from_value(params)
            .map_err(|e| JsonRpcError::invalid_params(format!("Invalid tools/call params: {}", e)))?;
        let arguments = match params.arguments {
            Some(Value::Null) | None => json!({}),
            Some(args) => args,
        };
        let result = self.call(&params.name, arguments).await?;
        serde_json::to_value(result).map_err(|e| JsonRpcError::new(INTERNAL_ERROR, e.to_string()))
    }
}
