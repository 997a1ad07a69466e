use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Execution Types
// =============================================================================

/// Identifier of the host-side context that owns an isolate's calls.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub String);

impl ContextId {
    /// Mint a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContextId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A call made by isolate code through the injected surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyCall {
    /// Context that started the execution.
    pub do_id: ContextId,
    /// Tool the isolate wants to call.
    pub function_name: String,
    /// Positional arguments; the first one is the tool input.
    #[serde(default)]
    pub args: Vec<Value>,
}

/// One audited `execute_code` attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: i64,
    pub code: String,
    pub result: Option<String>,
    pub error: Option<String>,
    pub executed_at: String,
}
