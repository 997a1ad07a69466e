//! Core type definitions for Codemode.
//!
//! Broken down into submodules by the surface that owns them.

pub mod context;
pub mod execution;
pub mod sql;
pub mod tool;

pub use context::*;
pub use execution::*;
pub use sql::*;
pub use tool::*;
