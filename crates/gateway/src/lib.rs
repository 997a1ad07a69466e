#![deny(unused)]
//! HTTP entry point for Codemode.
//!
//! Serves the JSON-RPC protocol endpoint, the isolate call-back proxy
//! endpoint, and the health, metrics and homepage routes.

pub mod server;

pub use server::{build_router, AppState, GatewayConfig, GatewayServer};
