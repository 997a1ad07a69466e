#![deny(unused)]
//! Tools and protocol surface for Codemode.
//!
//! This crate provides:
//! - Tool registry shared by the protocol surface and isolate call-backs
//! - Built-in SQL tools and the weather lookup
//! - JSON-RPC (MCP) adapter with schema validation
//! - `execute_code` / `get_type_schema` meta operations
//! - The per-context agent that wires all of the above together

pub mod agent;
pub mod builtin;
pub mod mcp_adapter;
pub mod meta;
pub mod network;
pub mod registry;

pub use agent::{AgentOptions, CodeModeAgent, SERVER_NAME, SERVER_VERSION};
pub use builtin::sql_tools;
pub use mcp_adapter::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, McpServer, McpTool, McpToolResult,
};
pub use meta::register_meta_tools;
pub use network::{weather_tool, WeatherClient, WeatherReport};
pub use registry::{ToolEntry, ToolRegistry};
