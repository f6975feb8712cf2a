//! Provider formatting helpers.

use serde_json::Value;

/// Convert an opaque tool value into the string fed back to the model.
pub fn tool_result_to_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
            value.to_string()
        }
    }
}

/// Parse model-produced argument text. Blank input means no arguments.
pub fn parse_tool_arguments(arguments: &str) -> serde_json::Result<Value> {
    if arguments.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(arguments)
}
