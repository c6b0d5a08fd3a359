//! Client for the Anthropic Messages API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{
    CompletionOptions, LlmClient, LlmResponse, Message, Role, ToolUse, Usage, finish_reason,
    map_send_error, record_completion, resolve_api_key,
};
use crate::error::LlmError;
use crate::models::LlmConfig;
use crate::observability::{SharedMetricsHook, elapsed_ms, noop_hook};
use crate::tools::{Tool, tools_to_anthropic_schema};
use crate::utils::{RetryConfig, with_retry};

const BACKEND: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";
/// The Messages API requires `max_tokens`.
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: u64,
    output_tokens: u64,
}

pub struct AnthropicLlmClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    retry: RetryConfig,
    metrics: SharedMetricsHook,
}

impl AnthropicLlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = resolve_api_key(config)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.resolved_url().trim_end_matches('/').to_string(),
            model: config.resolved_model(),
            api_key,
            retry: RetryConfig::new(config.max_retries).with_max_delay(Duration::from_secs(10)),
            metrics: noop_hook(),
        })
    }

    pub fn with_metrics_hook(mut self, hook: SharedMetricsHook) -> Self {
        self.metrics = hook;
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn request(&self, body: &MessagesRequest<'_>) -> Result<MessagesResponse, LlmError> {
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ServerError {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

/// System messages move to the top-level `system` field (joined by newlines);
/// tool results become `tool_result` blocks in a user turn.
fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system: Vec<&str> = Vec::new();
    let mut converted = Vec::new();

    for m in messages {
        match m.role {
            Role::System => system.push(&m.content),
            Role::Tool => converted.push(json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": m.tool_call_id,
                    "content": m.content,
                }]
            })),
            Role::User | Role::Assistant => {
                converted.push(json!({"role": m.role.as_str(), "content": m.content}));
            }
        }
    }

    let system = (!system.is_empty()).then(|| system.join("\n"));
    (system, converted)
}

fn normalize(raw: MessagesResponse, latency_ms: f64) -> LlmResponse {
    let mut text: Option<String> = None;
    let mut tool_calls = Vec::new();

    for block in raw.content {
        match block {
            ContentBlock::Text { text: part } => {
                text.get_or_insert_with(String::new).push_str(&part);
            }
            ContentBlock::ToolUse { id, name, input } => {
                let arguments = match input {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                tool_calls.push(ToolUse {
                    id,
                    name,
                    arguments,
                });
            }
            ContentBlock::Other => {}
        }
    }

    let usage = raw
        .usage
        .map(|u| Usage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        })
        .unwrap_or_default();

    LlmResponse {
        finish_reason: finish_reason(
            !tool_calls.is_empty(),
            raw.stop_reason.as_deref(),
            "end_turn",
            "max_tokens",
        ),
        content: text,
        tool_calls,
        usage,
        latency_ms,
    }
}

#[async_trait]
impl LlmClient for AnthropicLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[Tool],
        options: &CompletionOptions,
    ) -> Result<LlmResponse, LlmError> {
        let start = Instant::now();
        let (system, converted) = convert_messages(messages);
        let body = MessagesRequest {
            model: &self.model,
            messages: converted,
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: options.temperature,
            system,
            tools: tools_to_anthropic_schema(tools),
        };

        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "calling anthropic"
        );

        let result = with_retry(&self.retry, "anthropic completion", || self.request(&body))
            .await
            .into_result()
            .map(|raw| normalize(raw, elapsed_ms(start)));

        record_completion(&self.metrics, BACKEND, &self.model, start, &result);
        result
    }

    fn provider_name(&self) -> &'static str {
        BACKEND
    }

    fn model(&self) -> &str {
        &self.model
    }
}
