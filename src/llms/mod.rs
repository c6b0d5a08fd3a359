//! Chat-completion clients.
//!
//! Callers pass the full conversation on every call; clients keep no state
//! between calls. Provider wire formats stay inside each adapter, and only
//! [`LlmResponse`] comes back out. Retries cover transport failures (connect,
//! timeout, 429, 5xx), never the content of a reply.

mod anthropic;
mod openai;

pub use anthropic::AnthropicLlmClient;
pub use openai::OpenAiLlmClient;

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LlmError;
use crate::models::{LlmConfig, LlmProvider};
use crate::observability::{SharedMetricsHook, elapsed_ms, names};
use crate::tools::{Tool, ToolCall};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Id of the tool call this message answers. Set for [`Role::Tool`] only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Result of running the tool call `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolUse {
    /// The call in the shape [`crate::tools::ToolEngine::call_tool`] takes.
    pub fn to_tool_call(&self) -> ToolCall {
        ToolCall::new(self.name.clone(), self.arguments.clone())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Error,
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FinishReason::Stop => write!(f, "stop"),
            FinishReason::ToolCalls => write!(f, "tool_calls"),
            FinishReason::Length => write!(f, "length"),
            FinishReason::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolUse>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub latency_ms: f64,
}

/// Sampling options for one completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One completion over the full `messages` history. `tools` may be empty.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[Tool],
        options: &CompletionOptions,
    ) -> Result<LlmResponse, LlmError>;

    fn provider_name(&self) -> &'static str;

    fn model(&self) -> &str;
}

/// Build the client selected by `config.provider`.
pub fn create_llm_client(
    config: &LlmConfig,
    metrics: SharedMetricsHook,
) -> Result<Box<dyn LlmClient>, LlmError> {
    let client: Box<dyn LlmClient> = match config.provider {
        LlmProvider::OpenAi => Box::new(OpenAiLlmClient::new(config)?.with_metrics_hook(metrics)),
        LlmProvider::Anthropic => {
            Box::new(AnthropicLlmClient::new(config)?.with_metrics_hook(metrics))
        }
    };
    tracing::info!(
        provider = client.provider_name(),
        model = client.model(),
        "llm client ready"
    );
    Ok(client)
}

/// Tool calls win over the provider's stop reason.
fn finish_reason(
    has_tool_calls: bool,
    stop: Option<&str>,
    stop_value: &str,
    length_value: &str,
) -> FinishReason {
    if has_tool_calls {
        return FinishReason::ToolCalls;
    }
    match stop {
        Some(s) if s == stop_value => FinishReason::Stop,
        Some(s) if s == length_value => FinishReason::Length,
        _ => FinishReason::Error,
    }
}

/// Latency, request, error and token metrics for one completion.
fn record_completion(
    metrics: &SharedMetricsHook,
    provider: &str,
    model: &str,
    start: Instant,
    result: &Result<LlmResponse, LlmError>,
) {
    let labels = [("provider", provider), ("model", model)];
    metrics.record_latency(names::LLM_COMPLETION_DURATION, elapsed_ms(start), &labels);
    metrics.increment(names::LLM_REQUESTS_TOTAL, 1, &labels);

    match result {
        Ok(response) => {
            metrics.increment(names::LLM_TOKENS_PROMPT, response.usage.prompt_tokens, &labels);
            metrics.increment(
                names::LLM_TOKENS_COMPLETION,
                response.usage.completion_tokens,
                &labels,
            );
            metrics.increment(names::LLM_TOKENS_TOTAL, response.usage.total_tokens, &labels);
            tracing::info!(
                provider,
                finish = %response.finish_reason,
                tokens = response.usage.total_tokens,
                latency_ms = response.latency_ms as u64,
                "completion done"
            );
        }
        Err(e) => {
            metrics.increment(names::LLM_ERRORS_TOTAL, 1, &labels);
            tracing::warn!(provider, error = %e, "completion failed");
        }
    }
}

fn map_send_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else if e.is_connect() {
        LlmError::ConnectionError(e.to_string())
    } else {
        LlmError::RequestError(e)
    }
}

fn resolve_api_key(config: &LlmConfig) -> Result<String, LlmError> {
    config
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            LlmError::ConfigError(format!(
                "{} API key missing: set llm.api_key or {}",
                config.provider,
                config.provider.api_key_env()
            ))
        })
}
