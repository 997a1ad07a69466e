//! Error types for Codemode.

use thiserror::Error;

/// Result type alias using Codemode's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Codemode.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// A capability required by an operation was never wired up.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // =========================================================================
    // Registry / Protocol Errors
    // =========================================================================
    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("Unknown tool: {0}")]
    ToolNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    ToolExecution(String),

    // =========================================================================
    // Store Errors
    // =========================================================================
    #[error("Statement not allowed: {0}")]
    StatementRejected(String),

    #[error("Parameter count mismatch: query has {expected} placeholders but {actual} params were provided")]
    ParameterMismatch { expected: usize, actual: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    // =========================================================================
    // Sandbox / Proxy Errors
    // =========================================================================
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Proxy routing failed: {0}")]
    ProxyRouting(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a tool not found error.
    pub fn tool_not_found(name: impl Into<String>) -> Self {
        Self::ToolNotFound(name.into())
    }

    /// Create a tool execution error.
    pub fn tool_execution(msg: impl Into<String>) -> Self {
        Self::ToolExecution(msg.into())
    }

    /// Create a rejected statement error.
    pub fn statement_rejected(msg: impl Into<String>) -> Self {
        Self::StatementRejected(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a sandbox error.
    pub fn sandbox(msg: impl Into<String>) -> Self {
        Self::Sandbox(msg.into())
    }

    /// Create a proxy routing error.
    pub fn proxy_routing(msg: impl Into<String>) -> Self {
        Self::ProxyRouting(msg.into())
    }

    /// Create an unauthorized error.
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create a forbidden error.
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Message suitable for a data-bearing error payload.
    ///
    /// Tool failures and rejected statements surface their own message
    /// verbatim; everything else keeps its category prefix.
    pub fn payload_message(&self) -> String {
        match self {
            Self::ToolExecution(msg) | Self::StatementRejected(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_mismatch_message() {
        let err = Error::ParameterMismatch {
            expected: 2,
            actual: 1,
        };
        assert_eq!(
            err.to_string(),
            "Parameter count mismatch: query has 2 placeholders but 1 params were provided"
        );
    }

    #[test]
    fn test_payload_message_strips_tool_prefix() {
        let err = Error::tool_execution("Location not found: \"Atlantis\"");
        assert_eq!(err.payload_message(), "Location not found: \"Atlantis\"");
        assert_eq!(Error::tool_not_found("nope").payload_message(), "Unknown tool: nope");
    }
}
