//! Convenience re-exports.

pub use crate::config::TurnwiseConfig;
pub use crate::error::{ErrorCategory, Result, TurnwiseError};
pub use crate::generation::{operate, stream_operate, OperateOptions, OperateResponse};
pub use crate::hooks::OperateHooks;
pub use crate::provider::{ProviderAdapter, ProviderPayload, ToolDefinition};
pub use crate::tools::{FunctionTool, Tool, ToolArguments, ToolParameters, ToolRegistry, ToolSet};
pub use crate::types::{
    HistoryItem, OperateRequest, OutputSchema, Role, StreamChunk, ToolCall, ToolResult, Usage,
};
pub use crate::util::retry::RetryPolicy;
