//! The `Tool` seam and a closure-backed implementation of it.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use super::arguments::ToolArguments;
use super::types::ToolParameters;
use crate::error::Result;
use crate::provider::ToolDefinition;

/// The model call a tool is answering.
#[derive(Debug, Clone, Default)]
pub struct ToolExecutionContext {
    /// Provider call id. Empty when the tool runs outside a model turn.
    pub call_id: String,
}

impl ToolExecutionContext {
    pub fn for_call(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
        }
    }
}

/// Something the model can call between turns.
///
/// `name` is the key a [`ToolSet`](super::ToolSet) dispatches on and must
/// equal `definition().name`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn definition(&self) -> ToolDefinition;

    /// Run the tool. The value is serialized into the tool result the model
    /// sees next turn; an error is recorded on the run and reported to the
    /// model as a failed call.
    async fn execute(&self, args: &ToolArguments, ctx: &ToolExecutionContext) -> Result<Value>;
}

type RunFn = Arc<dyn Fn(ToolArguments, ToolExecutionContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Tool whose behavior is an async closure.
#[derive(Clone)]
pub struct FunctionTool {
    definition: ToolDefinition,
    run: RunFn,
}

impl FunctionTool {
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        run: F,
    ) -> Self
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            definition: ToolDefinition {
                name: name.into(),
                description: description.into(),
                parameters: parameters.schema,
            },
            run: Arc::new(move |args, ctx| run(args, ctx).boxed()),
        }
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, args: &ToolArguments, ctx: &ToolExecutionContext) -> Result<Value> {
        (self.run)(args.clone(), ctx.clone()).await
    }
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FunctionTool").field(&self.definition.name).finish()
    }
}
