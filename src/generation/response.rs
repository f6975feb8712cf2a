//! Final operate result and the builder that accumulates it across turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::{HistoryItem, Usage};

/// Status recorded when one or more tool calls failed.
pub const TOOL_FAILURE_STATUS: u16 = 500;

/// One failed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub tool_name: String,
    pub call_id: String,
    pub message: String,
}

/// Error attached to a run that still produced a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperateError {
    pub status: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetail>,
}

/// Result of a non-streaming operate run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperateResponse {
    pub id: Uuid,
    pub model: String,
    pub provider: String,
    pub content: Option<Value>,
    pub history: Vec<HistoryItem>,
    /// One entry per model call.
    pub usage: Vec<Usage>,
    pub raw_responses: Vec<Value>,
    pub error: Option<OperateError>,
    pub complete: bool,
    pub created_at: DateTime<Utc>,
}

impl OperateResponse {
    /// Content as text, when the final answer is a string.
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(Value::as_str)
    }

    pub fn total_usage(&self) -> Usage {
        Usage::total(&self.usage)
    }
}

/// Accumulates an [`OperateResponse`].
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    id: Uuid,
    model: String,
    provider: String,
    created_at: DateTime<Utc>,
    content: Option<Value>,
    history: Vec<HistoryItem>,
    usage: Vec<Usage>,
    raw_responses: Vec<Value>,
    error: Option<OperateError>,
    complete: bool,
}

impl ResponseBuilder {
    pub fn new(model: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            model: model.into(),
            provider: provider.into(),
            created_at: Utc::now(),
            content: None,
            history: Vec::new(),
            usage: Vec::new(),
            raw_responses: Vec::new(),
            error: None,
            complete: false,
        }
    }

    /// Replace the history wholesale. Only used at initialization.
    pub fn set_history(&mut self, history: Vec<HistoryItem>) {
        self.history = history;
    }

    pub fn append_history(&mut self, item: HistoryItem) {
        self.history.push(item);
    }

    pub fn extend_history(&mut self, items: impl IntoIterator<Item = HistoryItem>) {
        self.history.extend(items);
    }

    pub fn history(&self) -> &[HistoryItem] {
        &self.history
    }

    pub fn add_usage(&mut self, usage: Usage) {
        self.usage.push(usage);
    }

    pub fn extend_usage(&mut self, usage: impl IntoIterator<Item = Usage>) {
        self.usage.extend(usage);
    }

    pub fn usage(&self) -> &[Usage] {
        &self.usage
    }

    pub fn add_raw_response(&mut self, raw: Value) {
        self.raw_responses.push(raw);
    }

    pub fn set_content(&mut self, content: Option<Value>) {
        self.content = content;
    }

    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    pub fn mark_incomplete(&mut self) {
        self.complete = false;
    }

    /// Record a failed tool call. The first failure sets the error; later
    /// failures add details to it.
    pub fn record_tool_error(
        &mut self,
        tool_name: impl Into<String>,
        call_id: impl Into<String>,
        message: impl Into<String>,
    ) {
        let detail = ErrorDetail {
            tool_name: tool_name.into(),
            call_id: call_id.into(),
            message: message.into(),
        };
        self.error
            .get_or_insert_with(|| OperateError {
                status: TOOL_FAILURE_STATUS,
                message: "tool call failed".to_string(),
                details: Vec::new(),
            })
            .details
            .push(detail);
    }

    /// Set the run-level error, keeping any tool error details.
    pub fn set_error(&mut self, status: u16, message: impl Into<String>) {
        let details = self.error.take().map(|e| e.details).unwrap_or_default();
        self.error = Some(OperateError {
            status,
            message: message.into(),
            details,
        });
    }

    pub fn error(&self) -> Option<&OperateError> {
        self.error.as_ref()
    }

    /// Snapshot of the current state. May be called repeatedly.
    pub fn build(&self) -> OperateResponse {
        OperateResponse {
            id: self.id,
            model: self.model.clone(),
            provider: self.provider.clone(),
            content: self.content.clone(),
            history: self.history.clone(),
            usage: self.usage.clone(),
            raw_responses: self.raw_responses.clone(),
            error: self.error.clone(),
            complete: self.complete,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn build_is_repeatable() {
        let mut builder = ResponseBuilder::new("m", "p");
        builder.add_usage(Usage::new(3, 4));
        let first = builder.build();
        let second = builder.build();
        assert_eq!(first, second);
        assert!(!first.complete);
    }

    #[test]
    fn tool_errors_accumulate_details() {
        let mut builder = ResponseBuilder::new("m", "p");
        builder.record_tool_error("lookup", "c1", "boom");
        builder.record_tool_error("fetch", "c2", "timeout");
        let error = builder.error().unwrap();
        assert_eq!(error.status, TOOL_FAILURE_STATUS);
        assert_eq!(error.details.len(), 2);
        assert_eq!(error.details[1].tool_name, "fetch");
    }

    #[test]
    fn set_error_keeps_tool_details() {
        let mut builder = ResponseBuilder::new("m", "p");
        builder.record_tool_error("lookup", "c1", "boom");
        builder.set_error(429, "exceeded 2 turns");
        let error = builder.build().error.unwrap();
        assert_eq!(error.status, 429);
        assert_eq!(error.message, "exceeded 2 turns");
        assert_eq!(error.details.len(), 1);
    }
}
