use std::time::Instant;

use serde_json::Value;

use super::{ToolCall, ToolRegistry};
use crate::error::ToolError;
use crate::observability::{SharedMetricsHook, elapsed_ms, names, noop_hook};

/// Dispatches [`ToolCall`]s against a registry.
pub struct ToolEngine {
    registry: ToolRegistry,
    metrics: SharedMetricsHook,
}

impl ToolEngine {
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            metrics: noop_hook(),
        }
    }

    pub fn with_metrics_hook(mut self, hook: SharedMetricsHook) -> Self {
        self.metrics = hook;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    /// Look up the tool, validate the arguments and run it.
    pub fn call_tool(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let start = Instant::now();
        let labels = [("tool", call.tool_name.as_str())];

        let result = self.dispatch(call);

        self.metrics
            .record_latency(names::TOOL_CALL_DURATION, elapsed_ms(start), &labels);
        self.metrics.increment(names::TOOL_CALLS_TOTAL, 1, &labels);

        if let Err(e) = &result {
            self.metrics.increment(names::TOOL_ERRORS_TOTAL, 1, &labels);
            tracing::warn!(tool = %call.tool_name, error = %e, "tool call failed");
        }

        result
    }

    fn dispatch(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let tool = self.registry.get(&call.tool_name)?;
        let arguments = Value::Object(call.arguments.clone());

        tool.validate(&arguments)?;
        tracing::debug!(tool = tool.name(), "calling tool");
        tool.invoke(arguments)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::observability::testing::RecordingHook;
    use crate::tools::tool::fixtures::{add_tool, divide_tool};

    fn engine(hook: Arc<RecordingHook>) -> ToolEngine {
        let mut registry = ToolRegistry::new();
        registry.register(add_tool()).unwrap();
        registry.register(divide_tool()).unwrap();
        ToolEngine::new(registry).with_metrics_hook(hook)
    }

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall::new(name, arguments.as_object().cloned().unwrap())
    }

    #[test]
    fn test_call_tool_returns_handler_result() {
        let hook = Arc::new(RecordingHook::default());
        let engine = engine(hook.clone());

        let result = engine.call_tool(&call("add", json!({"a": 2, "b": 40}))).unwrap();

        assert_eq!(result, json!({"sum": 42}));
        assert_eq!(hook.counter_total(names::TOOL_CALLS_TOTAL), 1);
        assert_eq!(hook.counter_total(names::TOOL_ERRORS_TOTAL), 0);
        assert_eq!(hook.latency_names(), [names::TOOL_CALL_DURATION]);
    }

    #[test]
    fn test_call_tool_error_kinds() {
        let hook = Arc::new(RecordingHook::default());
        let engine = engine(hook.clone());

        assert!(matches!(
            engine.call_tool(&call("multiply", json!({}))),
            Err(ToolError::NotFound(_))
        ));
        assert!(matches!(
            engine.call_tool(&call("add", json!({"a": 1}))),
            Err(ToolError::Validation { .. })
        ));
        assert!(matches!(
            engine.call_tool(&call("divide", json!({"numerator": 1, "denominator": 0}))),
            Err(ToolError::Execution { .. })
        ));

        assert_eq!(hook.counter_total(names::TOOL_CALLS_TOTAL), 3);
        assert_eq!(hook.counter_total(names::TOOL_ERRORS_TOTAL), 3);
    }

    #[test]
    fn test_metrics_labelled_by_tool() {
        let hook = Arc::new(RecordingHook::default());
        let engine = engine(hook.clone());

        engine.call_tool(&call("add", json!({"a": 1, "b": 1}))).unwrap();

        let counters = hook.counters.lock().unwrap();
        assert_eq!(counters[0].2, [("tool".to_string(), "add".to_string())]);
    }

    #[test]
    fn test_registry_mut() {
        let mut engine = ToolEngine::new(ToolRegistry::new());
        assert!(engine.call_tool(&call("add", json!({"a": 1, "b": 1}))).is_err());

        engine.registry_mut().register(add_tool()).unwrap();
        assert_eq!(
            engine.call_tool(&call("add", json!({"a": 1, "b": 1}))).unwrap()["sum"],
            2
        );
        assert_eq!(engine.registry().names(), ["add"]);
    }
}
