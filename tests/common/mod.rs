//! Shared test helpers and a scripted provider adapter.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use turnwise::error::{ProviderErrorClass, Result, TransportError, TurnwiseError};
use turnwise::provider::{ProviderAdapter, ProviderPayload};
use turnwise::tools::{FunctionTool, ToolParameters, ToolSet};
use turnwise::types::{HistoryItem, OperateRequest, StreamChunk, ToolCall, ToolResult, Usage};
use turnwise::util::retry::RetryPolicy;

/// What one streaming attempt does.
pub enum StreamScript {
    /// `execute_stream_request` itself fails.
    Fail(TurnwiseError),
    /// The stream yields these items in order.
    Items(Vec<Result<StreamChunk>>),
    /// Like `Items`, but each item waits out its delay first.
    Delayed(Vec<(Duration, Result<StreamChunk>)>),
}

/// Adapter that replays queued responses.
///
/// Responses use a tiny JSON convention:
/// `{"text", "tool_calls": [{"call_id","name","arguments"}], "usage", "structured", "error"}`.
#[derive(Default)]
pub struct ScriptedAdapter {
    responses: Mutex<VecDeque<Result<Value>>>,
    streams: Mutex<VecDeque<StreamScript>>,
    streaming: bool,
    pub requests: Mutex<Vec<Value>>,
    pub tokens: Mutex<Vec<CancellationToken>>,
    pub tool_outputs: Mutex<Vec<Value>>,
    /// Items pulled from `Delayed` streams.
    pub delayed_polled: Arc<AtomicUsize>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn streaming() -> Self {
        Self {
            streaming: true,
            ..Self::default()
        }
    }

    pub fn push_response(&self, response: Value) -> &Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn push_error(&self, error: TurnwiseError) -> &Self {
        self.responses.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn push_stream(&self, script: StreamScript) -> &Self {
        self.streams.lock().unwrap().push_back(script);
        self
    }

    pub fn calls(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }

    pub fn token_states(&self) -> Vec<bool> {
        self.tokens
            .lock()
            .unwrap()
            .iter()
            .map(CancellationToken::is_cancelled)
            .collect()
    }

    fn record(&self, request: &Value, cancel: &CancellationToken) {
        self.requests.lock().unwrap().push(request.clone());
        self.tokens.lock().unwrap().push(cancel.clone());
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn build_request(&self, request: &OperateRequest) -> Result<ProviderPayload> {
        Ok(json!({
            "model": request.model,
            "history": serde_json::to_value(&request.history)?,
            "instructions": request.instructions,
            "tools": request.tools,
            "tool_outputs": [],
        }))
    }

    async fn execute_request(
        &self,
        request: &ProviderPayload,
        cancel: CancellationToken,
    ) -> Result<ProviderPayload> {
        self.record(request, &cancel);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TurnwiseError::InvalidArgument("script exhausted".into())))
    }

    fn supports_streaming(&self) -> bool {
        self.streaming
    }

    async fn execute_stream_request(
        &self,
        request: &ProviderPayload,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, Result<StreamChunk>>> {
        self.record(request, &cancel);
        let script = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| StreamScript::Fail(TurnwiseError::InvalidArgument("script exhausted".into())));
        match script {
            StreamScript::Fail(err) => Err(err),
            StreamScript::Items(items) => Ok(Box::pin(futures::stream::iter(items))),
            StreamScript::Delayed(items) => {
                let polled = self.delayed_polled.clone();
                Ok(Box::pin(async_stream::stream! {
                    for (delay, item) in items {
                        tokio::time::sleep(delay).await;
                        polled.fetch_add(1, Ordering::SeqCst);
                        yield item;
                    }
                }))
            }
        }
    }

    fn parse_response(&self, response: &ProviderPayload) -> Result<Option<Value>> {
        if let Some(message) = response.get("error").and_then(Value::as_str) {
            return Err(TurnwiseError::Provider {
                provider: "scripted".into(),
                message: message.into(),
            });
        }
        Ok(response.get("text").cloned())
    }

    fn extract_tool_calls(&self, response: &ProviderPayload) -> Result<Vec<ToolCall>> {
        Ok(response
            .get("tool_calls")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .map(|c| ToolCall {
                call_id: c["call_id"].as_str().unwrap_or_default().to_string(),
                name: c["name"].as_str().unwrap_or_default().to_string(),
                arguments: c["arguments"].as_str().unwrap_or_default().to_string(),
                raw: c.clone(),
            })
            .collect())
    }

    fn extract_usage(&self, response: &ProviderPayload) -> Option<Usage> {
        serde_json::from_value(response.get("usage")?.clone()).ok()
    }

    fn append_tool_result(
        &self,
        request: &mut ProviderPayload,
        call: &ToolCall,
        result: &ToolResult,
    ) -> Result<()> {
        let output = json!({"call_id": call.call_id, "output": result.output});
        self.tool_outputs.lock().unwrap().push(output.clone());
        request["tool_outputs"]
            .as_array_mut()
            .ok_or_else(|| TurnwiseError::InvalidArgument("no tool_outputs".into()))?
            .push(output);
        Ok(())
    }

    fn response_to_history_items(&self, response: &ProviderPayload) -> Result<Vec<HistoryItem>> {
        let mut items = Vec::new();
        if let Some(text) = response.get("text").and_then(Value::as_str) {
            items.push(HistoryItem::assistant(text));
        }
        for call in self.extract_tool_calls(response)? {
            items.push(HistoryItem::function_call(call.call_id, call.name, call.arguments));
        }
        Ok(items)
    }

    fn has_structured_output(&self, response: &ProviderPayload) -> bool {
        response.get("structured").is_some()
    }

    fn extract_structured_output(&self, response: &ProviderPayload) -> Option<Value> {
        response.get("structured").cloned()
    }
}

/// Adapter whose provider verdict is fixed, for classifier tests.
pub struct VerdictAdapter(pub Option<ProviderErrorClass>);

#[async_trait]
impl ProviderAdapter for VerdictAdapter {
    fn provider_name(&self) -> &str {
        "verdict"
    }

    fn build_request(&self, _request: &OperateRequest) -> Result<ProviderPayload> {
        Ok(Value::Null)
    }

    async fn execute_request(
        &self,
        _request: &ProviderPayload,
        _cancel: CancellationToken,
    ) -> Result<ProviderPayload> {
        Ok(Value::Null)
    }

    fn parse_response(&self, _response: &ProviderPayload) -> Result<Option<Value>> {
        Ok(None)
    }

    fn extract_tool_calls(&self, _response: &ProviderPayload) -> Result<Vec<ToolCall>> {
        Ok(Vec::new())
    }

    fn extract_usage(&self, _response: &ProviderPayload) -> Option<Usage> {
        None
    }

    fn classify_error(&self, _error: &TurnwiseError) -> Option<ProviderErrorClass> {
        self.0
    }

    fn append_tool_result(
        &self,
        _request: &mut ProviderPayload,
        _call: &ToolCall,
        _result: &ToolResult,
    ) -> Result<()> {
        Ok(())
    }

    fn response_to_history_items(&self, _response: &ProviderPayload) -> Result<Vec<HistoryItem>> {
        Ok(Vec::new())
    }
}

pub fn usage(input: u32, output: u32) -> Value {
    serde_json::to_value(Usage::new(input, output)).unwrap()
}

pub fn text_response(text: &str) -> Value {
    json!({"text": text, "usage": usage(10, 20)})
}

pub fn tool_call_response(calls: &[(&str, &str, &str)]) -> Value {
    let calls: Vec<Value> = calls
        .iter()
        .map(|(id, name, args)| json!({"call_id": id, "name": name, "arguments": args}))
        .collect();
    json!({"tool_calls": calls, "usage": usage(10, 5)})
}

pub fn connection_reset() -> TurnwiseError {
    TurnwiseError::Transport(TransportError::with_code("ECONNRESET", "read ECONNRESET"))
}

/// Policy with short, deterministic delays.
pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        backoff_factor: 2.0,
        max_retries,
    }
}

/// Weather tool counting its invocations.
pub fn weather_tools(calls: Arc<AtomicUsize>) -> ToolSet {
    ToolSet::new().with_tool(FunctionTool::new(
        "weather",
        "Current weather for a city",
        ToolParameters::object()
            .string("city", "City name", true)
            .build(),
        move |args, _ctx| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let city = args.get_str("city")?.to_string();
                Ok(json!({"city": city, "temp_c": 21}))
            }
        },
    ))
}

/// Tool that always fails.
pub fn failing_tool() -> FunctionTool {
    FunctionTool::new(
        "explode",
        "Always fails",
        ToolParameters::empty(),
        |_args, _ctx| async move {
            Err(TurnwiseError::ToolExecution {
                tool_name: "explode".into(),
                message: "kaboom".into(),
            })
        },
    )
}
