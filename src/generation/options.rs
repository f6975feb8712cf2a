//! Options for one operate run.

use std::collections::HashMap;
use std::sync::Arc;

use bon::Builder;
use serde_json::Value;

use crate::config::{TurnwiseConfig, DEFAULT_MAX_TURNS};
use crate::hooks::OperateHooks;
use crate::tools::ToolRegistry;
use crate::types::{HistoryItem, OutputSchema};
use crate::util::retry::RetryPolicy;

/// Inputs to [`operate`](super::operate) and
/// [`stream_operate`](super::stream_operate).
///
/// ```
/// use turnwise::generation::OperateOptions;
/// use turnwise::types::HistoryItem;
///
/// let options = OperateOptions::builder()
///     .model("gpt-4.1")
///     .input(vec![HistoryItem::user("What's the weather in {{city}}?")])
///     .variables([("city".to_string(), "Oslo".to_string())].into())
///     .max_turns(4)
///     .build();
/// assert_eq!(options.resolved_max_turns(), 4);
/// ```
#[derive(Clone, Builder)]
pub struct OperateOptions {
    #[builder(into)]
    pub model: String,
    /// Initial conversation history.
    #[builder(default)]
    pub input: Vec<HistoryItem>,
    #[builder(into)]
    pub instructions: Option<String>,
    pub output_schema: Option<OutputSchema>,
    pub tools: Option<Arc<dyn ToolRegistry>>,
    /// Turn limit; [`DEFAULT_MAX_TURNS`] when unset.
    pub max_turns: Option<u32>,
    /// Opaque options passed through to the provider request.
    pub provider_options: Option<Value>,
    /// Values for `{{name}}` placeholders in input and instructions.
    #[builder(default)]
    pub variables: HashMap<String, String>,
    #[builder(default)]
    pub hooks: OperateHooks,
    pub retry: Option<RetryPolicy>,
}

impl OperateOptions {
    /// Fill unset limits from configuration.
    pub fn with_config(mut self, config: &TurnwiseConfig) -> Self {
        if self.max_turns.is_none() {
            self.max_turns = config.max_turns;
        }
        if self.retry.is_none() {
            self.retry = Some(config.retry_policy());
        }
        self
    }

    pub fn resolved_max_turns(&self) -> u32 {
        self.max_turns.unwrap_or(DEFAULT_MAX_TURNS)
    }

    pub fn resolved_retry(&self) -> RetryPolicy {
        self.retry.clone().unwrap_or_default()
    }
}

impl std::fmt::Debug for OperateOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperateOptions")
            .field("model", &self.model)
            .field("input", &self.input.len())
            .field("instructions", &self.instructions.is_some())
            .field("output_schema", &self.output_schema.as_ref().map(|s| &s.name))
            .field("tools", &self.tools.as_ref().map(|t| t.definitions().len()))
            .field("max_turns", &self.max_turns)
            .field("hooks", &self.hooks)
            .field("retry", &self.retry)
            .finish()
    }
}
