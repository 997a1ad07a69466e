//! Metrics implementation using Prometheus.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sha2::{Digest, Sha256};

use codemode_core::{Error, Result};

/// Where a tool invocation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSurface {
    /// The outer protocol client.
    Protocol,
    /// Code running inside an isolate, via the call-back proxy.
    Isolate,
}

impl CallSurface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Isolate => "isolate",
        }
    }
}

/// Initialize Prometheus recorder and return the handle.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| {
            Error::configuration(format!("Failed to install Prometheus recorder: {}", e))
        })?;

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(handle)
}

/// Helper to track HTTP request metrics (latency, count).
pub fn track_request(method: &str, path: &str, status: u16, latency_sec: f64) {
    metrics::counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(latency_sec);
}

/// Count one tool invocation by surface and outcome (`ok`, `error`, `unknown`).
pub fn track_tool_call(surface: CallSurface, tool: &str, outcome: &'static str) {
    metrics::counter!(
        "codemode_tool_calls_total",
        "surface" => surface.as_str(),
        "tool" => tool.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Count one code execution and record its wall time.
pub fn track_execution(outcome: &'static str, latency_sec: f64) {
    metrics::counter!("codemode_executions_total", "outcome" => outcome).increment(1);
    metrics::histogram!("codemode_execution_duration_seconds", "outcome" => outcome)
        .record(latency_sec);
}

/// Count one request received on the call-back proxy.
pub fn track_proxy_call(outcome: &'static str) {
    metrics::counter!("codemode_proxy_calls_total", "outcome" => outcome).increment(1);
}

/// Short stable fingerprint of submitted code, for log correlation.
pub fn code_fingerprint(code: &str) -> String {
    let digest = Sha256::digest(code.as_bytes());
    digest[..6].iter().map(|b| format!("{:02x}", b)).collect()
}
