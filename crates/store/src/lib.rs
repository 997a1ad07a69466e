#![deny(unused)]
//! Persistence layer for Codemode.
//!
//! A single SQLite connection backs both the SQL tools and the execution
//! audit log. Agents create their own tables through the SQL tools; the
//! platform baseline only ensures `execution_log` exists.

pub mod execution_log;
pub mod schema;
pub mod sqlite;

pub use execution_log::{InMemoryExecutionLog, SqliteExecutionLog};
pub use schema::initialize_schema;
pub use sqlite::SqliteStore;
