#![deny(unused)]
//! Core types, traits, and error definitions for Codemode.
//!
//! This crate provides the foundational building blocks shared across all layers
//! of the tool server: tool and execution types, the store and handler seams,
//! the SQL statement policy, and configuration.

pub mod config;
pub mod error;
pub mod mocks;
pub mod sql_policy;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::*;
pub use types::*;
