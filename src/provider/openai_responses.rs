//! OpenAI Responses API adapter.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::http::{bearer_headers, build_client, sse_data, status_to_error, SseLines, DEFAULT_TIMEOUT};
use super::{ProviderAdapter, ProviderPayload, ToolDefinition};
use crate::config::TurnwiseConfig;
use crate::error::{Result, TurnwiseError};
use crate::types::{
    HistoryItem, OperateRequest, OutputSchema, StreamChunk, ToolCall, ToolCallChunk, ToolResult,
    Usage,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const PROVIDER_NAME: &str = "openai";

/// Adapter for `POST {base_url}/responses`.
pub struct OpenAiResponsesAdapter {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiResponsesAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiResponsesAdapter")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiResponsesAdapter {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Result<Self> {
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            client: build_client(DEFAULT_TIMEOUT)?,
        })
    }

    /// Build from configuration (`OPENAI_API_KEY`, `OPENAI_BASE_URL`).
    pub fn from_config(config: &TurnwiseConfig) -> Result<Self> {
        let api_key = config
            .api_key(PROVIDER_NAME)
            .ok_or_else(|| TurnwiseError::Authentication("Missing OPENAI_API_KEY".into()))?;
        Self::new(api_key, config.base_url(PROVIDER_NAME).map(str::to_string))
    }

    /// Replace the HTTP client (custom timeouts, proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/responses", self.base_url)
    }

    async fn send(
        &self,
        body: &Value,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let request = self
            .client
            .post(self.endpoint())
            .headers(bearer_headers(&self.api_key))
            .json(body)
            .send();
        let resp = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(TurnwiseError::Aborted("request cancelled".into()));
            }
            resp = request => resp?,
        };
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body_text));
        }
        Ok(resp)
    }

    fn input_item(item: &HistoryItem) -> Value {
        match item {
            HistoryItem::Message { role, content, .. } => json!({
                "role": role.to_string(),
                "content": content,
            }),
            HistoryItem::FunctionCall {
                call_id,
                name,
                arguments,
            } => json!({
                "type": "function_call",
                "call_id": call_id,
                "name": name,
                "arguments": arguments,
            }),
            HistoryItem::FunctionCallOutput {
                call_id, output, ..
            } => function_call_output(call_id, output),
        }
    }

    fn normalize_tool_parameters(schema: &Value) -> Value {
        let mut schema = schema.clone();
        if let Some(obj) = schema.as_object_mut() {
            if obj.get("type").and_then(Value::as_str) == Some("object") {
                obj.entry("required").or_insert_with(|| json!([]));
                obj.entry("properties").or_insert_with(|| json!({}));
            }
        }
        schema
    }
}

fn function_call_output(call_id: &str, output: &str) -> Value {
    json!({
        "type": "function_call_output",
        "call_id": call_id,
        "output": output,
    })
}

fn output_items(response: &Value) -> impl Iterator<Item = &Value> {
    response
        .get("output")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn item_type(item: &Value) -> &str {
    item.get("type").and_then(Value::as_str).unwrap_or("")
}

fn message_text(item: &Value) -> String {
    item.get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|part| item_type(part) == "output_text")
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect()
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn map_usage(usage: &Value) -> Option<Usage> {
    let count = |key: &str| usage.get(key).and_then(Value::as_u64).map(|v| v as u32);
    let input_tokens = count("input_tokens")?;
    let output_tokens = count("output_tokens").unwrap_or(0);
    Some(Usage {
        input_tokens,
        output_tokens,
        total_tokens: count("total_tokens").unwrap_or(input_tokens + output_tokens),
        cache_read_tokens: usage
            .pointer("/input_tokens_details/cached_tokens")
            .and_then(Value::as_u64)
            .map(|v| v as u32),
        reasoning_tokens: usage
            .pointer("/output_tokens_details/reasoning_tokens")
            .and_then(Value::as_u64)
            .map(|v| v as u32),
    })
}

/// Translate one Responses SSE event into a chunk.
///
/// `item_calls` maps output item ids to call ids, since argument deltas only
/// reference the item.
fn map_stream_event(event: &Value, item_calls: &mut HashMap<String, String>) -> Option<StreamChunk> {
    match item_type(event) {
        "response.output_text.delta" => {
            let delta = str_field(event, "delta")?;
            (!delta.is_empty()).then(|| StreamChunk::text(delta))
        }
        "response.output_item.added" => {
            let item = event.get("item")?;
            if item_type(item) != "function_call" {
                return None;
            }
            let call_id = str_field(item, "call_id")?.to_string();
            if let Some(item_id) = str_field(item, "id") {
                item_calls.insert(item_id.to_string(), call_id.clone());
            }
            Some(StreamChunk::ToolCall(ToolCallChunk {
                call_id: Some(call_id),
                name: str_field(item, "name").map(str::to_string),
                arguments: str_field(item, "arguments").unwrap_or_default().to_string(),
            }))
        }
        "response.function_call_arguments.delta" => {
            let delta = str_field(event, "delta")?;
            let call_id = str_field(event, "call_id")
                .map(str::to_string)
                .or_else(|| str_field(event, "item_id").and_then(|id| item_calls.get(id).cloned()));
            Some(StreamChunk::ToolCall(ToolCallChunk {
                call_id,
                name: None,
                arguments: delta.to_string(),
            }))
        }
        "response.completed" | "response.done" => {
            let usage = event
                .pointer("/response/usage")
                .and_then(map_usage)
                .into_iter()
                .collect();
            Some(StreamChunk::Done { usage })
        }
        "response.failed" => {
            let message = event
                .pointer("/response/error/message")
                .and_then(Value::as_str)
                .unwrap_or("response failed");
            Some(StreamChunk::error(message))
        }
        "error" => {
            let message = str_field(event, "message")
                .or_else(|| event.pointer("/error/message").and_then(Value::as_str))
                .unwrap_or("stream error");
            Some(StreamChunk::error(message))
        }
        _ => None,
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiResponsesAdapter {
    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    fn build_request(&self, request: &OperateRequest) -> Result<ProviderPayload> {
        let mut body = Map::new();
        body.insert("model".into(), json!(request.model));
        body.insert(
            "input".into(),
            Value::Array(request.history.iter().map(Self::input_item).collect()),
        );
        if let Some(instructions) = &request.instructions {
            body.insert("instructions".into(), json!(instructions));
        }
        if let Some(tools) = &request.tools {
            body.insert("tools".into(), tools.clone());
        }
        if let Some(format) = &request.output_format {
            body.insert("text".into(), json!({ "format": format }));
        }
        match &request.provider_options {
            Some(Value::Object(options)) => {
                for (key, value) in options {
                    body.insert(key.clone(), value.clone());
                }
            }
            Some(Value::Null) | None => {}
            Some(other) => {
                return Err(TurnwiseError::InvalidArgument(format!(
                    "provider options must be a JSON object, got {other}"
                )))
            }
        }
        Ok(Value::Object(body))
    }

    async fn execute_request(
        &self,
        request: &ProviderPayload,
        cancel: CancellationToken,
    ) -> Result<ProviderPayload> {
        debug!(endpoint = %self.endpoint(), "OpenAI Responses execute_request");
        let resp = self.send(request, &cancel).await?;
        let body = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(TurnwiseError::Aborted("request cancelled".into()));
            }
            body = resp.json::<Value>() => body?,
        };
        Ok(body)
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn execute_stream_request(
        &self,
        request: &ProviderPayload,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        let mut body = request.clone();
        if let Some(obj) = body.as_object_mut() {
            obj.insert("stream".into(), Value::Bool(true));
        }
        debug!(endpoint = %self.endpoint(), "OpenAI Responses execute_stream_request");
        let resp = self.send(&body, &cancel).await?;
        let byte_stream = resp.bytes_stream();

        let stream = async_stream::stream! {
            let mut lines = SseLines::default();
            let mut pending_data: Vec<String> = Vec::new();
            let mut item_calls: HashMap<String, String> = HashMap::new();
            let mut finished = false;
            futures::pin_mut!(byte_stream);

            'read: loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("OpenAI Responses stream cancelled");
                        finished = true;
                        break 'read;
                    }
                    next = byte_stream.next() => next,
                };
                let chunk = match next {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(e)) => {
                        finished = true;
                        yield Err(TurnwiseError::Network(e));
                        break 'read;
                    }
                    None => break 'read,
                };
                lines.push(&chunk);

                while let Some(line) = lines.next_line() {
                    if line.is_empty() {
                        if pending_data.is_empty() {
                            continue;
                        }
                        let data = pending_data.join("\n");
                        pending_data.clear();
                        if data == "[DONE]" {
                            finished = true;
                            break 'read;
                        }
                        match serde_json::from_str::<Value>(&data) {
                            Ok(event) => {
                                if let Some(chunk) = map_stream_event(&event, &mut item_calls) {
                                    let terminal = chunk.is_done() || matches!(chunk, StreamChunk::Error { .. });
                                    yield Ok(chunk);
                                    if terminal {
                                        finished = true;
                                        break 'read;
                                    }
                                }
                            }
                            Err(e) => debug!(error = %e, "OpenAI Responses SSE parse failed"),
                        }
                    } else if let Some(data) = sse_data(&line) {
                        pending_data.push(data.to_string());
                    }
                }
            }

            if !finished {
                warn!("OpenAI Responses stream closed without a terminal event");
                yield Err(TurnwiseError::Stream("stream ended before completion".into()));
            }
        };

        Ok(Box::pin(stream))
    }

    fn parse_response(&self, response: &ProviderPayload) -> Result<Option<Value>> {
        if let Some(message) = response.pointer("/error/message").and_then(Value::as_str) {
            return Err(TurnwiseError::Provider {
                provider: PROVIDER_NAME.into(),
                message: message.to_string(),
            });
        }
        let messages: Vec<String> = output_items(response)
            .filter(|item| item_type(item) == "message")
            .map(message_text)
            .collect();
        if messages.is_empty() {
            return Ok(None);
        }
        let text = messages.concat();
        let wants_json =
            response.pointer("/text/format/type").and_then(Value::as_str) == Some("json_schema");
        if wants_json {
            if let Ok(parsed) = serde_json::from_str::<Value>(&text) {
                return Ok(Some(parsed));
            }
        }
        Ok(Some(Value::String(text)))
    }

    fn extract_tool_calls(&self, response: &ProviderPayload) -> Result<Vec<ToolCall>> {
        output_items(response)
            .filter(|item| item_type(item) == "function_call")
            .map(|item| -> Result<ToolCall> {
                let call_id = str_field(item, "call_id").ok_or_else(|| {
                    TurnwiseError::Provider {
                        provider: PROVIDER_NAME.into(),
                        message: "function_call item without call_id".into(),
                    }
                })?;
                Ok(ToolCall {
                    call_id: call_id.to_string(),
                    name: str_field(item, "name").unwrap_or_default().to_string(),
                    arguments: str_field(item, "arguments").unwrap_or_default().to_string(),
                    raw: item.clone(),
                })
            })
            .collect()
    }

    fn extract_usage(&self, response: &ProviderPayload) -> Option<Usage> {
        response.get("usage").and_then(map_usage)
    }

    fn append_tool_result(
        &self,
        request: &mut ProviderPayload,
        call: &ToolCall,
        result: &ToolResult,
    ) -> Result<()> {
        let input = request
            .get_mut("input")
            .and_then(Value::as_array_mut)
            .ok_or_else(|| TurnwiseError::InvalidArgument("request has no input array".into()))?;
        input.push(function_call_output(&call.call_id, &result.output));
        Ok(())
    }

    fn response_to_history_items(&self, response: &ProviderPayload) -> Result<Vec<HistoryItem>> {
        Ok(output_items(response)
            .filter_map(|item| match item_type(item) {
                "message" => {
                    let text = message_text(item);
                    (!text.is_empty()).then(|| HistoryItem::assistant(text))
                }
                "function_call" => Some(HistoryItem::function_call(
                    str_field(item, "call_id")?,
                    str_field(item, "name").unwrap_or_default(),
                    str_field(item, "arguments").unwrap_or_default(),
                )),
                _ => None,
            })
            .collect())
    }

    fn format_tools(&self, tools: &[ToolDefinition]) -> Result<Value> {
        Ok(Value::Array(
            tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "name": t.name,
                        "description": t.description,
                        "parameters": Self::normalize_tool_parameters(&t.parameters),
                        "strict": false,
                    })
                })
                .collect(),
        ))
    }

    fn format_output_schema(&self, schema: &OutputSchema) -> Result<Value> {
        Ok(json!({
            "type": "json_schema",
            "name": schema.name,
            "schema": schema.schema,
            "strict": schema.strict,
        }))
    }
}
