//! Non-streaming multi-turn loop.

use tracing::{debug, info};

use super::dispatch::dispatch_tool_call;
use super::options::OperateOptions;
use super::response::OperateResponse;
use super::state::LoopState;
use crate::error::{Result, TurnwiseError, GATEWAY_STATUS};
use crate::hooks::{run_hook, ModelRequestContext, ModelResponseContext};
use crate::provider::ProviderAdapter;
use crate::util::retry::RetryExecutor;

/// Run a conversation until the model answers without tool calls, delivers
/// structured output, or the turn limit is reached.
///
/// Model calls go through the retry executor; a call that cannot be retried
/// surfaces as a gateway error. Tool failures do not fail the run; they are
/// recorded on the returned response. Reaching the turn limit with tool calls
/// still pending returns an incomplete response carrying a 429 error.
pub async fn operate(
    adapter: &dyn ProviderAdapter,
    options: OperateOptions,
) -> Result<OperateResponse> {
    let mut state = LoopState::init(adapter, &options)?;
    let retry = options.resolved_retry();
    let hooks = &options.hooks;
    let executor = RetryExecutor::new(&retry, adapter, hooks);

    while state.has_turns_left() {
        let turn = state.begin_turn();
        let request = state.operate_request();
        let mut provider_request = adapter.build_request(&request)?;
        debug!(turn, max_turns = state.max_turns, provider = adapter.provider_name(), "operate: calling provider");

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

        let ctx = state.retry_context("operate", adapter);
        let response = executor
            .execute(&ctx, |cancel| adapter.execute_request(&provider_request, cancel))
            .await?;

        let turn_usage = adapter.extract_usage(&response);
        run_hook(
            "after_each_model_response",
            hooks.after_each_model_response.as_ref(),
            ModelResponseContext {
                turn,
                model: state.model.clone(),
                provider_response: Some(response.clone()),
                turn_usage: turn_usage.clone(),
                usage: state.response.usage().to_vec(),
            },
        )
        .await;
        if let Some(usage) = turn_usage {
            state.response.add_usage(usage);
        }
        state.response.add_raw_response(response.clone());

        if adapter.has_structured_output(&response) {
            debug!(turn, "operate: structured output received");
            state
                .response
                .set_content(adapter.extract_structured_output(&response));
            state
                .response
                .extend_history(upstream(adapter.response_to_history_items(&response))?);
            state.response.mark_complete();
            break;
        }

        let tool_calls = upstream(adapter.extract_tool_calls(&response))?;
        if !tool_calls.is_empty() && state.can_dispatch_tools() {
            debug!(turn, count = tool_calls.len(), "operate: dispatching tool calls");
            state
                .response
                .extend_history(upstream(adapter.response_to_history_items(&response))?);
            for call in &tool_calls {
                dispatch_tool_call(adapter, &mut state, hooks, &mut provider_request, call).await?;
            }
            if state.turn_limit_reached() {
                state.mark_turn_limit_exceeded();
                break;
            }
            continue;
        }

        state.response.set_content(upstream(adapter.parse_response(&response))?);
        state
            .response
            .extend_history(upstream(adapter.response_to_history_items(&response))?);
        state.response.mark_complete();
        break;
    }

    let result = state.response.build();
    info!(
        turns = state.current_turn,
        complete = result.complete,
        provider = %result.provider,
        "operate finished"
    );
    Ok(result)
}

/// Failures reading a provider response reach callers as gateway errors,
/// the same shape as a failed model call.
fn upstream<T>(result: Result<T>) -> Result<T> {
    result.map_err(|err| TurnwiseError::gateway(GATEWAY_STATUS, err))
}
