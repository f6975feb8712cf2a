//! Tool system for function calling.

pub mod arguments;
pub mod registry;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use registry::{ToolRegistry, ToolSet};
pub use tool::{FunctionTool, Tool, ToolExecutionContext};
pub use types::{ParameterBuilder, ToolParameters};
