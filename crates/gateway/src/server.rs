//! Axum-based HTTP server for the gateway.

use axum::{
    body::Bytes,
    extract::{Json, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use codemode_core::{config::ServerConfig, types::ProxyCall, Error, Result};
use codemode_governance::track_request;
use codemode_sandbox::CallbackProxy;
use codemode_skills::{
    mcp_adapter::{INTERNAL_ERROR, INVALID_REQUEST, PARSE_ERROR},
    CodeModeAgent, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
};

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Enable CORS.
    pub enable_cors: bool,
    /// Enable request tracing.
    pub enable_tracing: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8787,
            enable_cors: true,
            enable_tracing: true,
        }
    }
}

impl From<&ServerConfig> for GatewayConfig {
    fn from(server: &ServerConfig) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            enable_cors: server.enable_cors,
            enable_tracing: true,
        }
    }
}

/// Shared application state.
pub struct AppState {
    /// Tool server behind `/mcp`.
    pub agent: Arc<CodeModeAgent>,
    /// Call-back proxy behind `/codemode/proxy`.
    pub proxy: Arc<CallbackProxy>,
}

/// Gateway server.
pub struct GatewayServer {
    config: GatewayConfig,
    state: Arc<AppState>,
    metrics_handle: Option<PrometheusHandle>,
}

impl GatewayServer {
    /// Create a new gateway server.
    pub fn new(config: GatewayConfig, agent: Arc<CodeModeAgent>, proxy: Arc<CallbackProxy>) -> Self {
        Self {
            config,
            state: Arc::new(AppState { agent, proxy }),
            metrics_handle: None,
        }
    }

    /// Set metrics handle.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Build the Axum router.
    pub fn build_router(&self) -> Router {
        build_router(&self.config, self.state.clone(), self.metrics_handle.clone())
    }

    /// Run the server.
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::configuration(format!("Failed to bind {}: {}", addr, e)))?;

        tracing::info!(addr = %addr, "Gateway server starting");

        axum::serve(listener, self.build_router())
            .await
            .map_err(|e| Error::internal(format!("Server error: {}", e)))?;

        Ok(())
    }
}

/// Assemble every route plus the shared layers.
pub fn build_router(
    config: &GatewayConfig,
    state: Arc<AppState>,
    metrics_handle: Option<PrometheusHandle>,
) -> Router {
    let mut router = Router::new()
        .route("/", get(home_handler))
        .route("/health", get(health_handler))
        .route("/mcp", post(mcp_handler))
        .route("/codemode/proxy", post(proxy_handler))
        .with_state(state);

    if let Some(handle) = metrics_handle {
        router = router.route("/metrics", get(move || async move { handle.render() }));
    }

    router = router.layer(middleware::from_fn(track_metrics));

    if config.enable_cors {
        router = router.layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));
    }

    if config.enable_tracing {
        router = router.layer(TraceLayer::new_for_http());
    }

    router
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
}

const HOMEPAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Code Mode MCP Server</title></head>
<body>
<h1>Code Mode MCP Server</h1>
<p>Connect to <code>/mcp</code> using an MCP client.</p>
<h2>Available Tools:</h2>
<ul>
<li><b>sql_query</b> -- Execute SELECT queries against SQLite</li>
<li><b>sql_exec</b> -- Execute DDL/DML (CREATE TABLE, INSERT, UPDATE, DELETE)</li>
<li><b>sql_exec_batch</b> -- Execute several DDL/DML statements in one transaction</li>
<li><b>get_weather</b> -- Get current weather for any city</li>
<li><b>execute_code</b> -- Execute JavaScript in a sandboxed isolate</li>
<li><b>get_type_schema</b> -- Get TypeScript type definitions for all tools</li>
</ul>
</body>
</html>"#;

// =============================================================================
// Handlers
// =============================================================================

async fn track_metrics(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(req).await;
    track_request(
        &method,
        &path,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

async fn home_handler() -> Html<&'static str> {
    Html(HOMEPAGE)
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// JSON-RPC endpoint.
///
/// Malformed bodies get a JSON-RPC error with a null id. Notifications are
/// acknowledged with 202 and no body.
async fn mcp_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "Unparseable JSON-RPC body");
            return rpc_failure(Value::Null, PARSE_ERROR, format!("Parse error: {}", e));
        }
    };
    let id = raw.get("id").cloned().unwrap_or(Value::Null);
    let request: JsonRpcRequest = match serde_json::from_value(raw) {
        Ok(r) => r,
        Err(e) => return rpc_failure(id, INVALID_REQUEST, format!("Invalid request: {}", e)),
    };

    match state.agent.handle(request).await {
        Ok(Some(response)) => (StatusCode::OK, Json(response)).into_response(),
        Ok(None) => StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Agent failed to handle request");
            rpc_failure(id, INTERNAL_ERROR, e.to_string())
        }
    }
}

fn rpc_failure(id: Value, code: i64, message: String) -> Response {
    let response = JsonRpcResponse::failure(id, JsonRpcError::new(code, message));
    (StatusCode::OK, Json(response)).into_response()
}

/// Call-back endpoint used by isolates.
async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(call): Json<ProxyCall>,
) -> Response {
    let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    else {
        return proxy_error(&Error::unauthorized("missing bearer token"));
    };

    match state.proxy.handle(token, call).await {
        Ok(output) => match output.into_value() {
            Some(result) => (StatusCode::OK, Json(json!({ "result": result }))).into_response(),
            None => (StatusCode::OK, Json(json!({}))).into_response(),
        },
        Err(e) => proxy_error(&e),
    }
}

fn proxy_status(err: &Error) -> StatusCode {
    match err {
        Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        Error::Forbidden(_) => StatusCode::FORBIDDEN,
        Error::ProxyRouting(_) => StatusCode::NOT_FOUND,
        Error::ToolExecution(_)
        | Error::StatementRejected(_)
        | Error::ParameterMismatch { .. }
        | Error::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn proxy_error(err: &Error) -> Response {
    let status = proxy_status(err);
    if status.is_server_error() {
        tracing::error!(error = %err, "Proxy call failed");
    } else {
        tracing::debug!(error = %err, status = status.as_u16(), "Proxy call rejected");
    }
    (status, Json(json!({ "error": err.payload_message() }))).into_response()
}
