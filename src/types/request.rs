//! Provider-neutral request shape rebuilt on every turn.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::history::HistoryItem;

/// Everything an adapter needs to build one provider request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperateRequest {
    pub model: String,
    pub history: Vec<HistoryItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Output schema already formatted by the adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<Value>,
    /// Tool definitions already formatted by the adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    /// Opaque provider passthrough options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_options: Option<Value>,
}

/// A JSON schema the final answer must conform to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
    #[serde(default)]
    pub strict: bool,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
            strict: true,
        }
    }
}
