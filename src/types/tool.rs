//! Provider-neutral tool call and result shapes.

use serde::{Deserialize, Serialize};

/// A tool invocation extracted from a provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    /// Raw argument text as produced by the model.
    pub arguments: String,
    /// The provider's original representation of the call.
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl ToolCall {
    pub fn new(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            arguments: arguments.into(),
            raw: serde_json::Value::Null,
        }
    }
}

/// Outcome of dispatching one tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResult {
    pub output: String,
    pub success: bool,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            output: message.into(),
            success: false,
        }
    }
}
