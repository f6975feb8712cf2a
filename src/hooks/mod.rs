//! Lifecycle hooks for operate runs.
//!
//! Hooks are observers. A hook that returns an error or panics is logged and
//! ignored; it never changes the outcome of the run.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::error::{ErrorCategory, Result};
use crate::types::{OperateRequest, ToolCall, ToolResult, Usage};

/// Async observer invoked with an owned context.
pub type Hook<C> = Arc<dyn Fn(C) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Context for `before_each_model_request`.
#[derive(Debug, Clone)]
pub struct ModelRequestContext {
    pub turn: u32,
    pub model: String,
    pub request: OperateRequest,
    pub provider_request: Value,
}

/// Context for `after_each_model_response`.
#[derive(Debug, Clone)]
pub struct ModelResponseContext {
    pub turn: u32,
    pub model: String,
    pub provider_response: Option<Value>,
    /// Usage reported by this response.
    pub turn_usage: Option<Usage>,
    /// Usage recorded by earlier turns.
    pub usage: Vec<Usage>,
}

/// Context for `before_each_tool`.
#[derive(Debug, Clone)]
pub struct ToolCallContext {
    pub turn: u32,
    pub call: ToolCall,
}

/// Context for `after_each_tool`.
#[derive(Debug, Clone)]
pub struct ToolResultContext {
    pub turn: u32,
    pub call: ToolCall,
    pub result: ToolResult,
}

/// Context for `on_tool_error`.
#[derive(Debug, Clone)]
pub struct ToolErrorContext {
    pub turn: u32,
    pub call: ToolCall,
    pub error: String,
}

/// Context for the model error hooks.
#[derive(Debug, Clone)]
pub struct ModelErrorContext {
    pub turn: u32,
    pub attempt: u32,
    pub category: ErrorCategory,
    pub message: String,
    /// Backoff before the next attempt; `None` when giving up.
    pub delay: Option<Duration>,
}

/// Optional observers for one operate run.
#[derive(Clone, Default)]
pub struct OperateHooks {
    pub before_each_model_request: Option<Hook<ModelRequestContext>>,
    pub after_each_model_response: Option<Hook<ModelResponseContext>>,
    pub before_each_tool: Option<Hook<ToolCallContext>>,
    pub after_each_tool: Option<Hook<ToolResultContext>>,
    pub on_tool_error: Option<Hook<ToolErrorContext>>,
    pub on_retryable_model_error: Option<Hook<ModelErrorContext>>,
    pub on_unrecoverable_model_error: Option<Hook<ModelErrorContext>>,
}

impl fmt::Debug for OperateHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperateHooks")
            .field("before_each_model_request", &self.before_each_model_request.is_some())
            .field("after_each_model_response", &self.after_each_model_response.is_some())
            .field("before_each_tool", &self.before_each_tool.is_some())
            .field("after_each_tool", &self.after_each_tool.is_some())
            .field("on_tool_error", &self.on_tool_error.is_some())
            .field("on_retryable_model_error", &self.on_retryable_model_error.is_some())
            .field(
                "on_unrecoverable_model_error",
                &self.on_unrecoverable_model_error.is_some(),
            )
            .finish()
    }
}

macro_rules! hook_setter {
    ($method:ident, $field:ident, $ctx:ty) => {
        pub fn $method<F, Fut>(mut self, hook: F) -> Self
        where
            F: Fn($ctx) -> Fut + Send + Sync + 'static,
            Fut: std::future::Future<Output = Result<()>> + Send + 'static,
        {
            self.$field = Some(Arc::new(move |ctx| hook(ctx).boxed()));
            self
        }
    };
}

impl OperateHooks {
    pub fn new() -> Self {
        Self::default()
    }

    hook_setter!(with_before_each_model_request, before_each_model_request, ModelRequestContext);
    hook_setter!(with_after_each_model_response, after_each_model_response, ModelResponseContext);
    hook_setter!(with_before_each_tool, before_each_tool, ToolCallContext);
    hook_setter!(with_after_each_tool, after_each_tool, ToolResultContext);
    hook_setter!(with_on_tool_error, on_tool_error, ToolErrorContext);
    hook_setter!(with_on_retryable_model_error, on_retryable_model_error, ModelErrorContext);
    hook_setter!(
        with_on_unrecoverable_model_error,
        on_unrecoverable_model_error,
        ModelErrorContext
    );
}

/// Run a hook if present. Errors and panics are logged and discarded.
pub async fn run_hook<C>(name: &'static str, hook: Option<&Hook<C>>, ctx: C) {
    let Some(hook) = hook else {
        return;
    };
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| hook(ctx))) {
        Ok(future) => future,
        Err(panic) => {
            tracing::warn!(hook = name, panic = %panic_message(&*panic), "hook panicked");
            return;
        }
    };
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!(hook = name, error = %err, "hook failed"),
        Err(panic) => {
            tracing::warn!(hook = name, panic = %panic_message(&*panic), "hook panicked")
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
