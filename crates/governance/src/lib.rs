#![deny(unused)]
//! Observability for Codemode.
//!
//! This crate provides:
//! - Structured logging with optional OpenTelemetry export
//! - Prometheus metrics for tool calls, executions and proxy traffic
//! - Code fingerprints for correlating log lines with audit records

pub mod metrics;
pub mod tracing_layer;

pub use metrics::{
    code_fingerprint, setup_metrics_recorder, track_execution, track_proxy_call, track_request,
    track_tool_call, CallSurface,
};
pub use tracing_layer::configure_tracing;
