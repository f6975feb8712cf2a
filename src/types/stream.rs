//! Stream chunk protocol.

use serde::{Deserialize, Serialize};

use super::history::HistoryItem;
use super::usage::Usage;

/// A fragment of a tool call as it arrives on a stream.
///
/// The first fragment of a call carries `call_id` and `name`; later fragments
/// may carry only more `arguments` text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: String,
}

/// One element of a streamed operate run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    Text {
        text: String,
    },
    ToolCall(ToolCallChunk),
    ToolResult {
        call_id: String,
        name: String,
        result: String,
        success: bool,
    },
    Data {
        data: serde_json::Value,
    },
    /// A complete history item produced by the provider.
    Message {
        item: HistoryItem,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
    },
    Done {
        #[serde(default)]
        usage: Vec<Usage>,
    },
    Noop,
}

impl StreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            status: None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}
