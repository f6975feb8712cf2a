//! Tool registry contract and the bundled name-keyed implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::arguments::ToolArguments;
use super::tool::{Tool, ToolExecutionContext};
use crate::error::{Result, TurnwiseError};
use crate::provider::ToolDefinition;

/// Looks up and executes named tools.
///
/// Arguments arrive exactly as the model produced them; the result is an
/// opaque value serialized into the tool-result payload.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Definitions advertised to the model.
    fn definitions(&self) -> Vec<ToolDefinition>;

    async fn call(&self, name: &str, call_id: &str, arguments: &str) -> Result<Value>;
}

/// Registry over [`Tool`] trait objects, in registration order.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A later tool with the same name replaces the earlier.
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.add(Arc::new(tool));
        self
    }

    pub fn add(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => self.tools[slot] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&slot| &self.tools[slot])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.tools.iter().map(|t| t.name()))
            .finish()
    }
}

#[async_trait]
impl ToolRegistry for ToolSet {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    async fn call(&self, name: &str, call_id: &str, arguments: &str) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| TurnwiseError::ToolNotFound(name.to_string()))?;
        let args = ToolArguments::parse(arguments)?;
        tool.execute(&args, &ToolExecutionContext::for_call(call_id)).await
    }
}
