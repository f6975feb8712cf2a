//! Provider adapter contract and implementations.

pub mod format;
pub mod http;

#[cfg(feature = "openai")]
pub mod openai_responses;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{ProviderErrorClass, Result, TurnwiseError};
use crate::types::{HistoryItem, OperateRequest, OutputSchema, StreamChunk, ToolCall, ToolResult, Usage};

/// Provider-specific request or response body.
pub type ProviderPayload = Value;

/// Tool definition handed to an adapter for formatting.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Per-provider strategy consumed by the operate and stream loops.
///
/// The loops never branch on provider identity; everything provider-specific
/// goes through this trait. Adapters own their transport client.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name (e.g., "openai").
    fn provider_name(&self) -> &str;

    /// Translate a neutral request into the provider's request body.
    fn build_request(&self, request: &OperateRequest) -> Result<ProviderPayload>;

    /// Send a request and wait for the full response.
    async fn execute_request(
        &self,
        request: &ProviderPayload,
        cancel: CancellationToken,
    ) -> Result<ProviderPayload>;

    fn supports_streaming(&self) -> bool {
        false
    }

    /// Send a request and return its chunks as they arrive.
    async fn execute_stream_request(
        &self,
        _request: &ProviderPayload,
        _cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        Err(TurnwiseError::UnsupportedOperation(format!(
            "provider '{}' does not support streaming",
            self.provider_name()
        )))
    }

    /// Final content of a response without tool calls.
    fn parse_response(&self, response: &ProviderPayload) -> Result<Option<Value>>;

    fn extract_tool_calls(&self, response: &ProviderPayload) -> Result<Vec<ToolCall>>;

    fn extract_usage(&self, response: &ProviderPayload) -> Option<Usage>;

    /// Verdict on an error this provider recognizes. `None` means unknown.
    fn classify_error(&self, error: &TurnwiseError) -> Option<ProviderErrorClass> {
        error.provider_class()
    }

    /// Fold a tool result into the in-flight provider request.
    fn append_tool_result(
        &self,
        request: &mut ProviderPayload,
        call: &ToolCall,
        result: &ToolResult,
    ) -> Result<()>;

    /// History entry recording a tool result.
    fn format_tool_result(&self, call: &ToolCall, result: &ToolResult) -> HistoryItem {
        HistoryItem::function_call_output(&call.call_id, &result.output, result.success)
    }

    /// History entries produced by a response (assistant text, function calls).
    fn response_to_history_items(&self, response: &ProviderPayload) -> Result<Vec<HistoryItem>>;

    fn format_tools(&self, tools: &[ToolDefinition]) -> Result<Value> {
        Ok(serde_json::to_value(tools)?)
    }

    fn format_output_schema(&self, schema: &OutputSchema) -> Result<Value> {
        Ok(serde_json::to_value(schema)?)
    }

    /// Whether the response delivers structured output as a terminal call.
    fn has_structured_output(&self, _response: &ProviderPayload) -> bool {
        false
    }

    fn extract_structured_output(&self, _response: &ProviderPayload) -> Option<Value> {
        None
    }
}
