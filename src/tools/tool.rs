use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::ToolError;

type Validator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;
type Handler = Arc<dyn Fn(Value) -> Result<Value, ToolError> + Send + Sync>;

/// A named function with a typed, schema-described input.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    input_schema: Value,
    validator: Validator,
    handler: Handler,
}

impl Tool {
    /// Build a tool whose arguments deserialize into `I`. The JSON Schema
    /// advertised to providers is derived from `I`.
    pub fn new<I, O, F>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        I: DeserializeOwned + JsonSchema + 'static,
        O: Serialize + 'static,
        F: Fn(I) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        let name = name.into();
        let input_schema = serde_json::to_value(schemars::schema_for!(I))
            .unwrap_or_else(|_| json!({"type": "object"}));

        let validator: Validator = Arc::new(|arguments: &Value| {
            I::deserialize(arguments).map(|_| ()).map_err(|e| e.to_string())
        });

        let tool_name = name.clone();
        let handler: Handler = Arc::new(move |arguments: Value| {
            let input: I = serde_json::from_value(arguments).map_err(|e| ToolError::Validation {
                tool: tool_name.clone(),
                message: e.to_string(),
            })?;
            let output = handler(input).map_err(|e| ToolError::Execution {
                tool: tool_name.clone(),
                message: format!("{:#}", e),
            })?;
            serde_json::to_value(output).map_err(|e| ToolError::Execution {
                tool: tool_name.clone(),
                message: format!("unserializable result: {}", e),
            })
        });

        Self {
            name,
            description: description.into(),
            input_schema,
            validator,
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// JSON Schema of the tool's input.
    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    /// Check `arguments` against the input type without running the handler.
    pub fn validate(&self, arguments: &Value) -> Result<(), ToolError> {
        (self.validator)(arguments).map_err(|message| ToolError::Validation {
            tool: self.name.clone(),
            message,
        })
    }

    /// Deserialize `arguments` and run the handler.
    pub fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
        (self.handler)(arguments)
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// A request to run a registered tool, as produced by an LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolCall {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ToolError> {
        serde_json::from_str(json).map_err(|e| ToolError::InvalidCall(e.to_string()))
    }
}
