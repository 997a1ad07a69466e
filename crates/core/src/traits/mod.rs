//! Core traits for Codemode.
//!
//! Traits are organized by the layer that implements them:
//! - `skills`: handler and dispatch seams (ToolHandler, IsolateCallTarget)
//! - `store`: persistence seams (SqlExecutor, ExecutionLog)

pub mod skills;
pub mod store;

pub use skills::*;
pub use store::*;
