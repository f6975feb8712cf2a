//! Non-streaming operate loop.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{
    connection_reset, failing_tool, fast_retry, text_response, tool_call_response, weather_tools,
    ScriptedAdapter,
};
use turnwise::prelude::*;
use turnwise::hooks::{ModelResponseContext, ToolCallContext, ToolErrorContext};
use turnwise::types::OutputSchema;

fn options(max_turns: u32) -> OperateOptions {
    OperateOptions::builder()
        .model("test-model")
        .input(vec![HistoryItem::user("What's the weather in Oslo?")])
        .max_turns(max_turns)
        .retry(fast_retry(2))
        .build()
}

fn with_tools(options: OperateOptions, tools: ToolSet) -> OperateOptions {
    OperateOptions {
        tools: Some(Arc::new(tools)),
        ..options
    }
}

#[tokio::test(start_paused = true)]
async fn single_turn_returns_text() {
    let adapter = ScriptedAdapter::new();
    adapter.push_response(text_response("Sunny."));

    let response = operate(&adapter, options(5)).await.unwrap();

    assert!(response.complete);
    assert_eq!(response.text(), Some("Sunny."));
    assert_eq!(response.usage.len(), 1);
    assert_eq!(response.raw_responses.len(), 1);
    assert!(response.error.is_none());
    assert_eq!(response.provider, "scripted");
    assert_eq!(
        response.history,
        vec![
            HistoryItem::user("What's the weather in Oslo?"),
            HistoryItem::assistant("Sunny."),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn tool_call_then_answer() {
    let calls = Arc::new(AtomicUsize::new(0));
    let adapter = ScriptedAdapter::new();
    adapter
        .push_response(tool_call_response(&[("call_1", "weather", r#"{"city":"Oslo"}"#)]))
        .push_response(text_response("21 degrees in Oslo."));

    let response = operate(&adapter, with_tools(options(5), weather_tools(calls.clone())))
        .await
        .unwrap();

    assert!(response.complete);
    assert_eq!(response.text(), Some("21 degrees in Oslo."));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(response.usage.len(), 2);
    assert_eq!(response.total_usage().input_tokens, 20);

    let history = &response.history;
    assert_eq!(history.len(), 4);
    assert_eq!(history[1], HistoryItem::function_call("call_1", "weather", r#"{"city":"Oslo"}"#));
    assert_eq!(history[2].call_id(), Some("call_1"));
    match &history[2] {
        HistoryItem::FunctionCallOutput { output, success, .. } => {
            assert!(*success);
            assert_eq!(output, r#"{"city":"Oslo","temp_c":21}"#);
        }
        other => panic!("expected function output, got {other:?}"),
    }
    assert_eq!(history[3], HistoryItem::assistant("21 degrees in Oslo."));

    // The second request carries the tool call and its output in history.
    let requests = adapter.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1]["history"].as_array().unwrap().len(), 3);
    assert!(requests[0]["tools"].is_array());
    assert_eq!(adapter.tool_outputs.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn turn_limit_with_pending_calls_is_incomplete() {
    let calls = Arc::new(AtomicUsize::new(0));
    let adapter = ScriptedAdapter::new();
    adapter
        .push_response(tool_call_response(&[("c1", "weather", r#"{"city":"Oslo"}"#)]))
        .push_response(tool_call_response(&[("c2", "weather", r#"{"city":"Bergen"}"#)]));

    let response = operate(&adapter, with_tools(options(2), weather_tools(calls.clone())))
        .await
        .unwrap();

    assert!(!response.complete);
    assert_eq!(adapter.calls(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let error = response.error.unwrap();
    assert_eq!(error.status, 429);
    assert!(error.message.contains("exceeded 2 turns"));
    assert!(response.content.is_none());
}

#[tokio::test(start_paused = true)]
async fn single_turn_budget_returns_content_without_dispatch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let adapter = ScriptedAdapter::new();
    adapter.push_response(json!({
        "text": "I would call a tool.",
        "tool_calls": [{"call_id": "c1", "name": "weather", "arguments": "{}"}],
    }));

    let response = operate(&adapter, with_tools(options(1), weather_tools(calls.clone())))
        .await
        .unwrap();

    assert!(response.complete);
    assert_eq!(response.text(), Some("I would call a tool."));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn tool_failure_is_recorded_and_loop_continues() {
    let tool_errors = Arc::new(AtomicUsize::new(0));
    let seen = tool_errors.clone();
    let adapter = ScriptedAdapter::new();
    adapter
        .push_response(tool_call_response(&[
            ("c1", "explode", "{}"),
            ("c2", "missing_tool", "{}"),
        ]))
        .push_response(text_response("Sorry, that failed."));

    let mut opts = with_tools(options(3), ToolSet::new().with_tool(failing_tool()));
    opts.hooks = OperateHooks::new().with_on_tool_error(move |ctx: ToolErrorContext| {
        let seen = seen.clone();
        async move {
            assert!(!ctx.error.is_empty());
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let response = operate(&adapter, opts).await.unwrap();

    assert!(response.complete);
    assert_eq!(response.text(), Some("Sorry, that failed."));
    assert_eq!(tool_errors.load(Ordering::SeqCst), 2);
    let error = response.error.unwrap();
    assert_eq!(error.status, 500);
    assert_eq!(error.details.len(), 2);
    assert_eq!(error.details[0].tool_name, "explode");
    assert!(error.details[0].message.contains("kaboom"));
    assert!(error.details[1].message.contains("missing_tool"));

    let failed = response
        .history
        .iter()
        .filter(|item| matches!(item, HistoryItem::FunctionCallOutput { success: false, .. }))
        .count();
    assert_eq!(failed, 2);
}

#[tokio::test(start_paused = true)]
async fn structured_output_ends_the_run() {
    let adapter = ScriptedAdapter::new();
    adapter.push_response(json!({
        "structured": {"city": "Oslo", "temp_c": 21},
        "tool_calls": [{"call_id": "c1", "name": "weather", "arguments": "{}"}],
    }));
    let calls = Arc::new(AtomicUsize::new(0));
    let opts = OperateOptions {
        output_schema: Some(OutputSchema::new("weather", json!({"type": "object"}))),
        ..with_tools(options(4), weather_tools(calls.clone()))
    };

    let response = operate(&adapter, opts).await.unwrap();

    assert!(response.complete);
    assert_eq!(response.content, Some(json!({"city": "Oslo", "temp_c": 21})));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(adapter.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn placeholders_are_rendered_before_the_first_request() {
    let adapter = ScriptedAdapter::new();
    adapter.push_response(text_response("ok"));
    let opts = OperateOptions::builder()
        .model("test-model")
        .instructions("You answer for {{ team }}.")
        .input(vec![HistoryItem::user("Weather in {{city}}? {{unknown}}")])
        .variables([
            ("city".to_string(), "Oslo".to_string()),
            ("team".to_string(), "ops".to_string()),
        ]
        .into())
        .build();

    operate(&adapter, opts).await.unwrap();

    let requests = adapter.requests.lock().unwrap();
    assert_eq!(requests[0]["instructions"], "You answer for ops.");
    assert_eq!(
        requests[0]["history"][0]["content"],
        "Weather in Oslo? {{unknown}}"
    );
}

#[tokio::test(start_paused = true)]
async fn panicking_hooks_do_not_break_the_run() {
    let adapter = ScriptedAdapter::new();
    adapter
        .push_response(tool_call_response(&[("c1", "weather", r#"{"city":"Oslo"}"#)]))
        .push_response(text_response("done"));
    let calls = Arc::new(AtomicUsize::new(0));
    let mut opts = with_tools(options(3), weather_tools(calls));
    opts.hooks = OperateHooks::new()
        .with_before_each_tool(|_ctx: ToolCallContext| async {
            let explode = true;
            if explode {
                panic!("hook bug");
            }
            Ok(())
        })
        .with_after_each_model_response(|_ctx: ModelResponseContext| async {
            Err(TurnwiseError::InvalidArgument("observer failed".into()))
        });

    let response = operate(&adapter, opts).await.unwrap();

    assert!(response.complete);
    assert_eq!(response.text(), Some("done"));
}

#[tokio::test(start_paused = true)]
async fn response_hook_sees_turn_usage_before_it_is_recorded() {
    let seen: Arc<Mutex<Vec<(u32, usize, bool)>>> = Arc::default();
    let record = seen.clone();
    let adapter = ScriptedAdapter::new();
    adapter
        .push_response(tool_call_response(&[("c1", "weather", r#"{"city":"Oslo"}"#)]))
        .push_response(text_response("done"));
    let calls = Arc::new(AtomicUsize::new(0));
    let mut opts = with_tools(options(3), weather_tools(calls));
    opts.hooks = OperateHooks::new().with_after_each_model_response(move |ctx: ModelResponseContext| {
        let record = record.clone();
        async move {
            record
                .lock()
                .unwrap()
                .push((ctx.turn, ctx.usage.len(), ctx.turn_usage.is_some()));
            Ok(())
        }
    });

    operate(&adapter, opts).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![(1, 0, true), (2, 1, true)]);
}

#[tokio::test(start_paused = true)]
async fn transient_model_failure_is_retried_within_a_turn() {
    let adapter = ScriptedAdapter::new();
    adapter
        .push_error(connection_reset())
        .push_response(text_response("ok"));

    let response = operate(&adapter, options(2)).await.unwrap();

    assert_eq!(response.text(), Some("ok"));
    assert_eq!(adapter.calls(), 2);
    assert_eq!(response.usage.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unrecoverable_model_failure_surfaces_as_gateway_error() {
    let adapter = ScriptedAdapter::new();
    adapter.push_error(TurnwiseError::api(400, "context too long"));

    let err = operate(&adapter, options(2)).await.unwrap_err();

    assert!(err.is_gateway());
    assert_eq!(err.status(), Some(502));
    assert!(err.to_string().contains("context too long"));
}

#[tokio::test]
async fn unreadable_response_surfaces_as_gateway_error() {
    let adapter = ScriptedAdapter::new();
    adapter.push_response(json!({"error": "quota exhausted"}));

    let err = operate(&adapter, options(2)).await.unwrap_err();

    assert!(err.is_gateway());
    assert_eq!(err.status(), Some(502));
    assert!(err.to_string().contains("quota exhausted"));
    assert_eq!(adapter.calls(), 1);
}

#[tokio::test]
async fn zero_max_turns_is_rejected() {
    let adapter = ScriptedAdapter::new();
    let err = operate(&adapter, options(0)).await.unwrap_err();
    assert!(matches!(err, TurnwiseError::InvalidArgument(_)));
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn config_fills_unset_limits() {
    let config = TurnwiseConfig::from_toml_str("max_turns = 7\n[retry]\nmax_retries = 1\n").unwrap();
    let opts = OperateOptions::builder().model("m").build().with_config(&config);
    assert_eq!(opts.resolved_max_turns(), 7);
    assert_eq!(opts.resolved_retry().max_retries, 1);

    let explicit = options(2).with_config(&config);
    assert_eq!(explicit.resolved_max_turns(), 2);
    assert_eq!(explicit.resolved_retry().max_retries, 2);
}
