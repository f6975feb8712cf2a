//! Typed access to tool call arguments.

use serde_json::Value;

use crate::error::{Result, TurnwiseError};
use crate::provider::format::parse_tool_arguments;

/// Parsed tool call arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments {
    value: Value,
}

impl ToolArguments {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// Parse the raw argument text the model produced.
    pub fn parse(raw: &str) -> Result<Self> {
        parse_tool_arguments(raw)
            .map(Self::new)
            .map_err(|e| TurnwiseError::InvalidArgument(format!("malformed tool arguments: {e}")))
    }

    pub fn raw(&self) -> &Value {
        &self.value
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.value
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| missing("string", key))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Result<i64> {
        self.value
            .get(key)
            .and_then(Value::as_i64)
            .ok_or_else(|| missing("integer", key))
    }

    pub fn get_f64(&self, key: &str) -> Result<f64> {
        self.value
            .get(key)
            .and_then(Value::as_f64)
            .ok_or_else(|| missing("number", key))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.value
            .get(key)
            .and_then(Value::as_bool)
            .ok_or_else(|| missing("boolean", key))
    }

    /// Deserialize all arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.value.clone())
            .map_err(|e| TurnwiseError::InvalidArgument(format!("invalid tool arguments: {e}")))
    }
}

fn missing(kind: &str, key: &str) -> TurnwiseError {
    TurnwiseError::InvalidArgument(format!("Missing {kind} argument: {key}"))
}
