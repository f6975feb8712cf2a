//! Sequential tool dispatch shared by both loops.

use serde_json::Value;

use super::state::LoopState;
use crate::error::{Result, TurnwiseError};
use crate::hooks::{
    run_hook, OperateHooks, ToolCallContext, ToolErrorContext, ToolResultContext,
};
use crate::provider::format::tool_result_to_string;
use crate::provider::ProviderAdapter;
use crate::types::{ToolCall, ToolResult};

/// Dispatch one tool call and feed its result back.
///
/// A failing tool does not fail the run: the error is recorded on the
/// response and a failed result is returned so the model can see it.
pub(crate) async fn dispatch_tool_call(
    adapter: &dyn ProviderAdapter,
    state: &mut LoopState,
    hooks: &OperateHooks,
    provider_request: &mut Value,
    call: &ToolCall,
) -> Result<ToolResult> {
    let turn = state.current_turn;
    run_hook(
        "before_each_tool",
        hooks.before_each_tool.as_ref(),
        ToolCallContext {
            turn,
            call: call.clone(),
        },
    )
    .await;

    // Checked by the callers through `can_dispatch_tools`.
    let outcome = match state.tools.clone() {
        Some(registry) => registry.call(&call.name, &call.call_id, &call.arguments).await,
        None => Err(TurnwiseError::ToolNotFound(call.name.clone())),
    };

    let result = match outcome {
        Ok(value) => {
            tracing::debug!(tool = %call.name, call_id = %call.call_id, turn, "tool call succeeded");
            let result = ToolResult::success(tool_result_to_string(&value));
            run_hook(
                "after_each_tool",
                hooks.after_each_tool.as_ref(),
                ToolResultContext {
                    turn,
                    call: call.clone(),
                    result: result.clone(),
                },
            )
            .await;
            result
        }
        Err(err) => {
            let message = err.to_string();
            tracing::warn!(tool = %call.name, call_id = %call.call_id, error = %message, "Tool execution failed");
            run_hook(
                "on_tool_error",
                hooks.on_tool_error.as_ref(),
                ToolErrorContext {
                    turn,
                    call: call.clone(),
                    error: message.clone(),
                },
            )
            .await;
            state
                .response
                .record_tool_error(&call.name, &call.call_id, &message);
            ToolResult::failure(message)
        }
    };

    adapter.append_tool_result(provider_request, call, &result)?;
    state
        .response
        .append_history(adapter.format_tool_result(call, &result));
    Ok(result)
}
