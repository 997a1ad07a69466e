use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Tool Types
// =============================================================================

/// Literal rendered on the protocol surface when a handler returns nothing.
pub const NO_VALUE_TOKEN: &str = "undefined";

/// Output from a tool handler.
///
/// A handler either produces a JSON value or nothing at all; the two are kept
/// apart because `null` is a legitimate value for a tool to return.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// A JSON value.
    Value(Value),
    /// The handler completed without a value.
    Nothing,
}

impl ToolOutput {
    /// Wrap an already-built JSON value.
    pub fn value(value: Value) -> Self {
        Self::Value(value)
    }

    /// Serialize any value into a tool output.
    pub fn json<T: Serialize>(value: &T) -> crate::Result<Self> {
        Ok(Self::Value(serde_json::to_value(value)?))
    }

    /// Borrow the inner value, if any.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Nothing => None,
        }
    }

    /// Take the inner value, if any.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Nothing => None,
        }
    }

    /// Textual payload: JSON for values, the no-value token otherwise.
    pub fn to_text(&self) -> String {
        match self {
            Self::Value(v) => v.to_string(),
            Self::Nothing => NO_VALUE_TOKEN.to_string(),
        }
    }
}

impl From<Value> for ToolOutput {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Public description of a visible tool.
///
/// This is the shape the type generator and the protocol listing consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,

    /// Human-readable description.
    pub description: String,

    /// JSON Schema for tool input.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}
