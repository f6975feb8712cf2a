//! Conversation history entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
}

/// One entry of the conversation history.
///
/// History is append-only within a loop invocation: entries are pushed, never
/// edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryItem {
    Message {
        role: Role,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    /// A tool invocation requested by the model.
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    /// The output fed back for a previous function call.
    FunctionCallOutput {
        call_id: String,
        output: String,
        #[serde(default = "default_success")]
        success: bool,
    },
}

fn default_success() -> bool {
    true
}

impl HistoryItem {
    pub fn message(role: Role, content: impl Into<String>) -> Self {
        Self::Message {
            role,
            content: content.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::message(Role::System, content)
    }

    pub fn developer(content: impl Into<String>) -> Self {
        Self::message(Role::Developer, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::message(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::message(Role::Assistant, content)
    }

    pub fn function_call(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self::FunctionCall {
            call_id: call_id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    pub fn function_call_output(
        call_id: impl Into<String>,
        output: impl Into<String>,
        success: bool,
    ) -> Self {
        Self::FunctionCallOutput {
            call_id: call_id.into(),
            output: output.into(),
            success,
        }
    }

    /// Role of the entry, if it is a plain message.
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::Message { role, .. } => Some(*role),
            _ => None,
        }
    }

    /// Text content of a plain message.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Message { content, .. } => Some(content),
            _ => None,
        }
    }

    pub fn call_id(&self) -> Option<&str> {
        match self {
            Self::FunctionCall { call_id, .. } | Self::FunctionCallOutput { call_id, .. } => {
                Some(call_id)
            }
            Self::Message { .. } => None,
        }
    }
}
