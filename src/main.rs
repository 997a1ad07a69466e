#![deny(unused)]
//! Codemode - MCP tool server with sandboxed code execution.
//!
//! Serves SQL and weather tools over JSON-RPC, plus `execute_code`, which runs
//! submitted JavaScript in a fresh container that can call those same tools
//! back through an authenticated proxy.

use std::sync::Arc;

use codemode_core::{config::AppConfig, traits::ExecutionLog};
use codemode_gateway::{GatewayConfig, GatewayServer};
use codemode_sandbox::{CallbackProxy, DockerIsolateHost, IsolateConfig, IsolateHost};
use codemode_skills::{AgentOptions, CodeModeAgent, WeatherClient};
use codemode_store::{SqliteExecutionLog, SqliteStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // Initialize tracing
    codemode_governance::configure_tracing(config.telemetry.json_logs, &config.telemetry.log_filter)?;

    tracing::info!("Starting Codemode v{}", env!("CARGO_PKG_VERSION"));

    // =========================================================================
    // Store
    // =========================================================================
    let store = SqliteStore::open_configured(&config.store.database_path)?;
    let log: Arc<dyn ExecutionLog> = Arc::new(SqliteExecutionLog::new(store.clone()).await?);
    tracing::info!(path = %config.store.database_path, "SQLite store opened");

    // =========================================================================
    // Isolation host
    // =========================================================================
    let host: Option<Arc<dyn IsolateHost>> = if !config.sandbox.enabled {
        tracing::info!("Isolation host disabled by configuration");
        None
    } else {
        match DockerIsolateHost::new(IsolateConfig::from(&config.sandbox)) {
            Ok(docker) => {
                if config.sandbox.network == "bridge" {
                    tracing::warn!("Isolates use the bridge network and can reach the host and the internet");
                }
                if docker.is_available().await {
                    tracing::info!(image = %config.sandbox.image, network = %config.sandbox.network, "Docker isolation host available");
                    Some(Arc::new(docker))
                } else {
                    tracing::warn!("Docker daemon not reachable - execute_code disabled");
                    None
                }
            }
            Err(e) => {
                tracing::warn!("Docker not available ({}). execute_code disabled.", e);
                None
            }
        }
    };

    // =========================================================================
    // Call-back proxy
    // =========================================================================
    let proxy = Arc::new(CallbackProxy::new());
    let proxy_endpoint = config
        .sandbox
        .proxy_url
        .as_deref()
        .map(|base| format!("{}/codemode/proxy", base.trim_end_matches('/')));
    if proxy_endpoint.is_none() {
        tracing::warn!("sandbox.proxy_url not set - execute_code cannot reach tools");
    }

    // =========================================================================
    // Agent
    // =========================================================================
    let weather = Arc::new(WeatherClient::new(&config.weather)?);
    let agent = Arc::new(CodeModeAgent::new(
        Arc::new(store),
        log,
        AgentOptions {
            host,
            proxy: proxy_endpoint.map(|endpoint| (proxy.clone(), endpoint)),
            weather: Some(weather),
        },
    ));
    agent.init().await?;
    tracing::info!(do_id = %agent.do_id(), "Tool server initialized");

    // =========================================================================
    // Gateway
    // =========================================================================
    let gateway_config = GatewayConfig::from(&config.server);
    let mut server = GatewayServer::new(gateway_config, agent, proxy);
    if config.telemetry.metrics_enabled {
        server = server.with_metrics(codemode_governance::setup_metrics_recorder()?);
    }

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║  Codemode v{:<50}║", env!("CARGO_PKG_VERSION"));
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Endpoints:                                                  ║");
    println!("║    GET  /                - Homepage                          ║");
    println!("║    GET  /health          - Health check                      ║");
    println!("║    POST /mcp             - MCP (JSON-RPC 2.0)                ║");
    println!("║    POST /codemode/proxy  - Isolate call-back proxy           ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Server: {:<52}║", format!("http://{}", config.bind_addr()));
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    server.run().await?;

    Ok(())
}
