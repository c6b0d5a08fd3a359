//! Tool definitions in the shapes LLM providers expect.

use serde_json::{Value, json};

use super::Tool;

/// `{"type": "function", "function": {name, description, parameters}}` per tool.
pub fn tools_to_openai_schema<'a>(tools: impl IntoIterator<Item = &'a Tool>) -> Vec<Value> {
    tools
        .into_iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name(),
                    "description": tool.description(),
                    "parameters": tool.input_schema(),
                }
            })
        })
        .collect()
}

/// `{name, description, input_schema}` per tool.
pub fn tools_to_anthropic_schema<'a>(tools: impl IntoIterator<Item = &'a Tool>) -> Vec<Value> {
    tools
        .into_iter()
        .map(|tool| {
            json!({
                "name": tool.name(),
                "description": tool.description(),
                "input_schema": tool.input_schema(),
            })
        })
        .collect()
}
