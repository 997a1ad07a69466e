use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use codemode_core::mocks::MockExecutionLog;
use codemode_gateway::{GatewayConfig, GatewayServer};
use codemode_sandbox::CallbackProxy;
use codemode_skills::{AgentOptions, CodeModeAgent};
use codemode_store::SqliteStore;

// =============================================================================
// Helpers
// =============================================================================

struct TestApp {
    app: Router,
    agent: Arc<CodeModeAgent>,
    proxy: Arc<CallbackProxy>,
}

async fn test_app() -> TestApp {
    let proxy = Arc::new(CallbackProxy::new());
    let agent = Arc::new(CodeModeAgent::new(
        Arc::new(SqliteStore::in_memory().unwrap()),
        Arc::new(MockExecutionLog::new()),
        AgentOptions {
            proxy: Some((proxy.clone(), "http://127.0.0.1:8787/codemode/proxy".into())),
            ..AgentOptions::default()
        },
    ));
    agent.init().await.unwrap();
    let server = GatewayServer::new(GatewayConfig::default(), agent.clone(), proxy.clone());
    TestApp {
        app: server.build_router(),
        agent,
        proxy,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn proxy_request(token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/codemode/proxy")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

// =============================================================================
// 1. Plain routes
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let t = test_app().await;
    let (status, body) = send(
        &t.app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_homepage() {
    let t = test_app().await;
    let (status, body) = send(&t.app, Request::builder().uri("/").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains("execute_code"));
    assert!(html.contains("<code>/mcp</code>"));
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let t = test_app().await;
    let (status, _) = send(
        &t.app,
        Request::builder().uri("/nope").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// 2. JSON-RPC endpoint
// =============================================================================

#[tokio::test]
async fn test_mcp_initialize() {
    let t = test_app().await;
    let (status, body) = send(
        &t.app,
        post_json(
            "/mcp",
            json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {} }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["id"], 1);
    assert_eq!(json["result"]["serverInfo"]["name"], "Code Mode MCP Server");
}

#[tokio::test]
async fn test_mcp_parse_error() {
    let t = test_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&t.app, request).await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"]["code"], -32700);
    assert_eq!(json["id"], Value::Null);
}

#[tokio::test]
async fn test_mcp_notification_accepted() {
    let t = test_app().await;
    let (status, body) = send(
        &t.app,
        post_json(
            "/mcp",
            json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_mcp_tool_call() {
    let t = test_app().await;
    let (_, body) = send(
        &t.app,
        post_json(
            "/mcp",
            json!({
                "jsonrpc": "2.0",
                "id": "q",
                "method": "tools/call",
                "params": { "name": "sql_query", "arguments": { "query": "SELECT 1 AS one" } }
            }),
        ),
    )
    .await;

    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["id"], "q");
    let text = json["result"]["content"][0]["text"].as_str().unwrap();
    assert_eq!(serde_json::from_str::<Value>(text).unwrap(), json!([{ "one": 1 }]));
}

// =============================================================================
// 3. Call-back proxy endpoint
// =============================================================================

#[tokio::test]
async fn test_proxy_requires_token() {
    let t = test_app().await;
    let body = json!({ "doId": t.agent.do_id(), "functionName": "sql_tables", "args": [] });
    let (status, body) = send(&t.app, proxy_request(None, body)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_proxy_routes_to_hidden_tool() {
    let t = test_app().await;
    let ticket = t.proxy.open_ticket(t.agent.do_id());
    let body = json!({ "doId": t.agent.do_id(), "functionName": "sql_tables", "args": [] });
    let (status, body) = send(
        &t.app,
        proxy_request(Some(ticket.token().expose_secret().as_str()), body),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["result"], json!([]));
}

#[tokio::test]
async fn test_proxy_unknown_tool_is_a_value() {
    let t = test_app().await;
    let ticket = t.proxy.open_ticket(t.agent.do_id());
    let body = json!({ "doId": t.agent.do_id(), "functionName": "nope", "args": [] });
    let (status, body) = send(
        &t.app,
        proxy_request(Some(ticket.token().expose_secret().as_str()), body),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["result"], json!({ "error": "Unknown tool: nope" }));
}

#[tokio::test]
async fn test_proxy_handler_error_is_non_2xx() {
    let t = test_app().await;
    let ticket = t.proxy.open_ticket(t.agent.do_id());
    let body = json!({
        "doId": t.agent.do_id(),
        "functionName": "sql_query",
        "args": [{ "query": "DROP TABLE x" }]
    });
    let (status, body) = send(
        &t.app,
        proxy_request(Some(ticket.token().expose_secret().as_str()), body),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().starts_with("sql_query only allows"));
}

#[tokio::test]
async fn test_proxy_ticket_bound_to_context() {
    let t = test_app().await;
    let ticket = t.proxy.open_ticket(t.agent.do_id());
    let body = json!({ "doId": "someone-else", "functionName": "sql_tables", "args": [] });
    let (status, _) = send(
        &t.app,
        proxy_request(Some(ticket.token().expose_secret().as_str()), body),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    t.proxy.revoke(&ticket);
    let body = json!({ "doId": t.agent.do_id(), "functionName": "sql_tables", "args": [] });
    let (status, _) = send(
        &t.app,
        proxy_request(Some(ticket.token().expose_secret().as_str()), body),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
