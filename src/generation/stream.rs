//! Streaming multi-turn loop.

use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dispatch::dispatch_tool_call;
use super::options::OperateOptions;
use super::state::LoopState;
use crate::error::{Result, TurnwiseError, GATEWAY_STATUS, TOO_MANY_REQUESTS_STATUS};
use crate::hooks::{run_hook, ModelRequestContext, ModelResponseContext};
use crate::provider::ProviderAdapter;
use crate::types::{HistoryItem, StreamChunk, ToolCall, ToolCallChunk, Usage};
use crate::util::retry::RetryExecutor;

/// Run a conversation as a stream of chunks.
///
/// Text, tool-call fragments, data and provider errors are forwarded as they
/// arrive. A failed attempt is retried only while nothing from that attempt
/// has been forwarded; after that the failure becomes an `Error` chunk. A
/// failure that cannot be retried before any output ends the stream with an
/// `Err` item. Every other outcome ends with exactly one `Done` chunk
/// carrying the usage of every model call.
pub fn stream_operate(
    adapter: Arc<dyn ProviderAdapter>,
    options: OperateOptions,
) -> BoxStream<'static, Result<StreamChunk>> {
    let stream = try_stream! {
        if !adapter.supports_streaming() {
            Err::<(), _>(TurnwiseError::gateway(
                GATEWAY_STATUS,
                TurnwiseError::UnsupportedOperation(format!(
                    "provider '{}' does not support streaming",
                    adapter.provider_name()
                )),
            ))?;
        }

        let mut state = LoopState::init(adapter.as_ref(), &options)?;
        let retry = options.resolved_retry();
        let hooks = &options.hooks;
        let executor = RetryExecutor::new(&retry, adapter.as_ref(), hooks);

        'turns: while state.has_turns_left() {
            let turn = state.begin_turn();
            let request = state.operate_request();
            let mut provider_request = adapter.build_request(&request)?;
            debug!(turn, max_turns = state.max_turns, provider = adapter.provider_name(), "stream_operate: calling provider");

            run_hook(
                "before_each_model_request",
                hooks.before_each_model_request.as_ref(),
                ModelRequestContext {
                    turn,
                    model: state.model.clone(),
                    request,
                    provider_request: provider_request.clone(),
                },
            )
            .await;

            let ctx = state.retry_context("stream_operate", adapter.as_ref());
            let mut attempt = 0u32;
            let mut turn_output = loop {
                let token = CancellationToken::new();
                let mut acc = TurnAccumulator::default();
                let mut delivered = false;

                let failure = match adapter
                    .execute_stream_request(&provider_request, token.clone())
                    .await
                {
                    Err(err) => Some((err, None)),
                    Ok(mut chunks) => {
                        let mut failed = None;
                        while let Some(item) = chunks.next().await {
                            let chunk = match item {
                                Ok(chunk) => chunk,
                                Err(err) => {
                                    failed = Some(err);
                                    break;
                                }
                            };
                            if let Some(forward) = acc.absorb(chunk) {
                                delivered = true;
                                yield forward;
                            }
                            if acc.provider_error {
                                token.cancel();
                                break;
                            }
                        }
                        failed.map(|err| (err, Some(chunks)))
                    }
                };

                let Some((err, aborted)) = failure else {
                    break acc;
                };
                token.cancel();

                if delivered {
                    warn!(turn, attempt, error = %err, "stream failed after output was delivered");
                    yield StreamChunk::Error {
                        message: err.to_string(),
                        status: err.status(),
                    };
                    state.response.extend_usage(acc.usage);
                    break 'turns;
                }

                let delay = executor.handle_failure(&ctx, err, attempt).await?;
                match aborted {
                    Some(aborted) => suppress_late_errors(aborted, delay).await,
                    None => tokio::time::sleep(delay).await,
                }
                attempt += 1;
            };

            let turn_usage = (!turn_output.usage.is_empty()).then(|| Usage::total(&turn_output.usage));
            run_hook(
                "after_each_model_response",
                hooks.after_each_model_response.as_ref(),
                ModelResponseContext {
                    turn,
                    model: state.model.clone(),
                    provider_response: None,
                    turn_usage,
                    usage: state.response.usage().to_vec(),
                },
            )
            .await;
            state.response.extend_usage(std::mem::take(&mut turn_output.usage));

            if turn_output.provider_error {
                break 'turns;
            }

            let tool_calls = turn_output.tool_calls();
            if !tool_calls.is_empty() && state.can_dispatch_tools() {
                debug!(turn, count = tool_calls.len(), "stream_operate: dispatching tool calls");
                state.response.extend_history(turn_output.into_history(&tool_calls));
                for call in &tool_calls {
                    let result = dispatch_tool_call(
                        adapter.as_ref(),
                        &mut state,
                        hooks,
                        &mut provider_request,
                        call,
                    )
                    .await?;
                    yield StreamChunk::ToolResult {
                        call_id: call.call_id.clone(),
                        name: call.name.clone(),
                        result: result.output,
                        success: result.success,
                    };
                }
                if state.turn_limit_reached() {
                    state.mark_turn_limit_exceeded();
                    yield StreamChunk::Error {
                        message: state.turn_limit_message(),
                        status: Some(TOO_MANY_REQUESTS_STATUS),
                    };
                    break 'turns;
                }
                continue 'turns;
            }

            state.response.extend_history(turn_output.into_history(&[]));
            state.response.mark_complete();
            break 'turns;
        }

        info!(turns = state.current_turn, provider = adapter.provider_name(), "stream_operate finished");
        yield StreamChunk::Done {
            usage: state.response.usage().to_vec(),
        };
    };
    Box::pin(stream)
}

/// Sleep out the backoff while draining whatever the aborted attempt still
/// produces. Late chunks and errors from it are discarded.
async fn suppress_late_errors(mut aborted: BoxStream<'static, Result<StreamChunk>>, delay: Duration) {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return,
            item = aborted.next() => match item {
                Some(Err(err)) => debug!(error = %err, "discarding late error from aborted attempt"),
                Some(Ok(_)) => debug!("discarding late chunk from aborted attempt"),
                None => {
                    (&mut sleep).await;
                    return;
                }
            },
        }
    }
}

/// Everything one streaming attempt produced.
#[derive(Debug, Default)]
struct TurnAccumulator {
    text: String,
    calls: ToolCallAccumulator,
    messages: Vec<HistoryItem>,
    usage: Vec<Usage>,
    provider_error: bool,
}

impl TurnAccumulator {
    /// Record a chunk and return it if it should reach the caller.
    fn absorb(&mut self, chunk: StreamChunk) -> Option<StreamChunk> {
        match chunk {
            StreamChunk::Text { ref text } => {
                self.text.push_str(text);
                Some(chunk)
            }
            StreamChunk::ToolCall(ref fragment) => {
                self.calls.push(fragment);
                Some(chunk)
            }
            StreamChunk::Data { .. } => Some(chunk),
            StreamChunk::Error { .. } => {
                self.provider_error = true;
                Some(chunk)
            }
            StreamChunk::Message { item } => {
                self.messages.push(item);
                None
            }
            StreamChunk::Done { usage } => {
                self.usage.extend(usage);
                None
            }
            StreamChunk::ToolResult { .. } | StreamChunk::Noop => None,
        }
    }

    fn tool_calls(&self) -> Vec<ToolCall> {
        self.calls.finish()
    }

    /// History for this turn. Provider-supplied messages take precedence over
    /// the accumulated text and call fragments.
    fn into_history(self, tool_calls: &[ToolCall]) -> Vec<HistoryItem> {
        if !self.messages.is_empty() {
            return self.messages;
        }
        let mut items = Vec::with_capacity(tool_calls.len() + 1);
        if !self.text.is_empty() {
            items.push(HistoryItem::assistant(self.text));
        }
        items.extend(
            tool_calls
                .iter()
                .map(|c| HistoryItem::function_call(&c.call_id, &c.name, &c.arguments)),
        );
        items
    }
}

#[derive(Debug, Default)]
struct PendingCall {
    call_id: String,
    name: String,
    arguments: String,
}

/// Reassembles tool calls from streamed fragments, in first-seen order.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    calls: Vec<PendingCall>,
}

impl ToolCallAccumulator {
    fn push(&mut self, fragment: &ToolCallChunk) {
        let slot = match fragment.call_id.as_deref() {
            Some(id) => match self.calls.iter().position(|c| c.call_id == id) {
                Some(index) => index,
                None => {
                    self.calls.push(PendingCall {
                        call_id: id.to_string(),
                        ..Default::default()
                    });
                    self.calls.len() - 1
                }
            },
            None if !self.calls.is_empty() => self.calls.len() - 1,
            None => {
                warn!("dropping tool call fragment without a call id");
                return;
            }
        };
        let call = &mut self.calls[slot];
        if let Some(name) = &fragment.name {
            if call.name.is_empty() {
                call.name = name.clone();
            }
        }
        call.arguments.push_str(&fragment.arguments);
    }

    fn finish(&self) -> Vec<ToolCall> {
        self.calls
            .iter()
            .map(|c| ToolCall::new(&c.call_id, &c.name, &c.arguments))
            .collect()
    }
}
