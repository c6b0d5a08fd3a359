//! Client for OpenAI-compatible `/chat/completions` endpoints.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{
    CompletionOptions, LlmClient, LlmResponse, Message, ToolUse, Usage, finish_reason,
    map_send_error, record_completion, resolve_api_key,
};
use crate::error::LlmError;
use crate::models::LlmConfig;
use crate::observability::{SharedMetricsHook, elapsed_ms, noop_hook};
use crate::tools::{Tool, tools_to_openai_schema};
use crate::utils::{RetryConfig, with_retry};

const BACKEND: &str = "openai";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatToolCall {
    id: String,
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    /// JSON-encoded object.
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

pub struct OpenAiLlmClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    retry: RetryConfig,
    metrics: SharedMetricsHook,
}

impl OpenAiLlmClient {
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

    async fn request(&self, body: &ChatRequest<'_>) -> Result<ChatResponse, LlmError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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

fn convert_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let mut message = json!({"role": m.role.as_str(), "content": m.content});
            if let Some(id) = &m.tool_call_id {
                message["tool_call_id"] = json!(id);
            }
            message
        })
        .collect()
}

fn normalize(raw: ChatResponse, latency_ms: f64) -> Result<LlmResponse, LlmError> {
    let choice = raw
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

    let tool_calls: Vec<ToolUse> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let arguments = serde_json::from_str::<Map<String, Value>>(&call.function.arguments)
                .unwrap_or_else(|e| {
                    tracing::warn!(
                        tool = %call.function.name,
                        error = %e,
                        "unparseable tool call arguments"
                    );
                    Map::new()
                });
            ToolUse {
                id: call.id,
                name: call.function.name,
                arguments,
            }
        })
        .collect();

    let usage = raw
        .usage
        .map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        })
        .unwrap_or_default();

    Ok(LlmResponse {
        finish_reason: finish_reason(
            !tool_calls.is_empty(),
            choice.finish_reason.as_deref(),
            "stop",
            "length",
        ),
        content: choice.message.content,
        tool_calls,
        usage,
        latency_ms,
    })
}

#[async_trait]
impl LlmClient for OpenAiLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[Tool],
        options: &CompletionOptions,
    ) -> Result<LlmResponse, LlmError> {
        let start = Instant::now();
        let body = ChatRequest {
            model: &self.model,
            messages: convert_messages(messages),
            temperature: options.temperature,
            tools: tools_to_openai_schema(tools),
            max_tokens: options.max_tokens,
        };

        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "calling openai"
        );

        let result = with_retry(&self.retry, "openai completion", || self.request(&body))
            .await
            .into_result()
            .and_then(|raw| normalize(raw, elapsed_ms(start)));

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
