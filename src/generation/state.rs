//! Per-invocation loop state shared by the operate and stream loops.

use std::sync::Arc;

use serde_json::Value;

use super::options::OperateOptions;
use super::response::ResponseBuilder;
use crate::error::{Result, TurnwiseError, TOO_MANY_REQUESTS_STATUS};
use crate::provider::ProviderAdapter;
use crate::tools::ToolRegistry;
use crate::types::{HistoryItem, OperateRequest};
use crate::util::retry::RetryContext;
use crate::util::template::render_placeholders;

pub(crate) struct LoopState {
    pub current_turn: u32,
    pub max_turns: u32,
    pub model: String,
    instructions: Option<String>,
    provider_options: Option<Value>,
    pub tools: Option<Arc<dyn ToolRegistry>>,
    formatted_tools: Option<Value>,
    formatted_output: Option<Value>,
    pub response: ResponseBuilder,
}

impl LoopState {
    /// Validate options, render placeholders, and format tools and schema once.
    pub fn init(adapter: &dyn ProviderAdapter, options: &OperateOptions) -> Result<Self> {
        let max_turns = options.resolved_max_turns();
        if max_turns == 0 {
            return Err(TurnwiseError::InvalidArgument(
                "max_turns must be at least 1".into(),
            ));
        }
        if options.model.trim().is_empty() {
            return Err(TurnwiseError::InvalidArgument("model is required".into()));
        }

        let history = options
            .input
            .iter()
            .map(|item| match item {
                HistoryItem::Message {
                    role,
                    content,
                    timestamp,
                } => HistoryItem::Message {
                    role: *role,
                    content: render_placeholders(content, &options.variables),
                    timestamp: *timestamp,
                },
                other => other.clone(),
            })
            .collect();
        let instructions = options
            .instructions
            .as_deref()
            .map(|text| render_placeholders(text, &options.variables));

        let formatted_tools = match &options.tools {
            Some(registry) => {
                let definitions = registry.definitions();
                if definitions.is_empty() {
                    None
                } else {
                    Some(adapter.format_tools(&definitions)?)
                }
            }
            None => None,
        };
        let formatted_output = options
            .output_schema
            .as_ref()
            .map(|schema| adapter.format_output_schema(schema))
            .transpose()?;

        let mut response = ResponseBuilder::new(&options.model, adapter.provider_name());
        response.set_history(history);

        Ok(Self {
            current_turn: 0,
            max_turns,
            model: options.model.clone(),
            instructions,
            provider_options: options.provider_options.clone(),
            tools: options.tools.clone(),
            formatted_tools,
            formatted_output,
            response,
        })
    }

    pub fn has_turns_left(&self) -> bool {
        self.current_turn < self.max_turns
    }

    /// Advance to the next turn and return its number (1-based).
    pub fn begin_turn(&mut self) -> u32 {
        self.current_turn += 1;
        self.current_turn
    }

    pub fn turn_limit_reached(&self) -> bool {
        self.current_turn >= self.max_turns
    }

    /// Tool calls are only dispatched when a registry is present and a
    /// follow-up turn is possible at all.
    pub fn can_dispatch_tools(&self) -> bool {
        self.tools.is_some() && self.max_turns > 1
    }

    /// Fresh neutral request for the current turn.
    pub fn operate_request(&self) -> OperateRequest {
        OperateRequest {
            model: self.model.clone(),
            history: self.response.history().to_vec(),
            instructions: self.instructions.clone(),
            output_format: self.formatted_output.clone(),
            tools: self.formatted_tools.clone(),
            provider_options: self.provider_options.clone(),
        }
    }

    pub fn retry_context(&self, operation: &'static str, adapter: &dyn ProviderAdapter) -> RetryContext {
        RetryContext {
            operation,
            turn: self.current_turn,
            provider: adapter.provider_name().to_string(),
            model: self.model.clone(),
        }
    }

    pub fn turn_limit_message(&self) -> String {
        format!("exceeded {} turns", self.max_turns)
    }

    /// Record that tool calls are still pending with no turns left.
    pub fn mark_turn_limit_exceeded(&mut self) {
        let message = self.turn_limit_message();
        tracing::warn!(max_turns = self.max_turns, "turn limit reached with pending tool calls");
        self.response.set_error(TOO_MANY_REQUESTS_STATUS, message);
        self.response.mark_incomplete();
    }
}
