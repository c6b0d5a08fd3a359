//! Client for OpenAI-compatible `/embeddings` endpoints.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::try_join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use super::EmbeddingsClient;
use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;
use crate::observability::{SharedMetricsHook, elapsed_ms, names, noop_hook};
use crate::utils::{RetryConfig, with_retry};

const BACKEND: &str = "openai";

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

pub struct OpenAiEmbeddingsClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    batch_size: usize,
    max_concurrent: usize,
    retry: RetryConfig,
    metrics: SharedMetricsHook,
}

impl OpenAiEmbeddingsClient {
    /// Create a client. The API key must already be resolved into `config.api_key`
    /// (see [`crate::models::Config::load`]).
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                EmbeddingError::ConfigError(
                    "OpenAI API key missing: set embedding.api_key or OPENAI_API_KEY".to_string(),
                )
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            batch_size: config.batch_size.max(1) as usize,
            max_concurrent: config.max_concurrent.max(1) as usize,
            retry: RetryConfig::new(config.max_retries),
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

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let labels = [("backend", BACKEND)];
        let start = Instant::now();
        self.metrics
            .record_gauge(names::EMBEDDINGS_BATCH_SIZE, batch.len() as f64, &labels);

        let result = with_retry(&self.retry, "openai embeddings", || self.request(batch))
            .await
            .into_result();

        self.metrics
            .record_latency(names::EMBEDDINGS_DURATION, elapsed_ms(start), &labels);
        self.metrics
            .increment(names::EMBEDDINGS_REQUESTS_TOTAL, 1, &labels);
        if result.is_err() {
            self.metrics
                .increment(names::EMBEDDINGS_ERRORS_TOTAL, 1, &labels);
        }

        tracing::debug!(batch_size = batch.len(), ok = result.is_ok(), "embedding batch done");
        result
    }

    async fn request(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingsRequest {
            model: &self.model,
            input: batch,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ServerError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        into_ordered_vectors(parsed, batch.len())
    }
}

fn map_send_error(e: reqwest::Error) -> EmbeddingError {
    if e.is_timeout() {
        EmbeddingError::Timeout
    } else if e.is_connect() {
        EmbeddingError::ConnectionError(e.to_string())
    } else {
        EmbeddingError::RequestError(e)
    }
}

/// Providers may return items out of order; `index` is authoritative.
fn into_ordered_vectors(
    mut response: EmbeddingsResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if response.data.len() != expected {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            response.data.len()
        )));
    }
    response.data.sort_by_key(|d| d.index);
    Ok(response.data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl EmbeddingsClient for OpenAiEmbeddingsClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let semaphore = Semaphore::new(self.max_concurrent);
        let semaphore = &semaphore;
        let batches = texts.chunks(self.batch_size).map(move |batch| async move {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;
            self.embed_batch(batch).await
        });

        let results = try_join_all(batches).await?;
        let vectors: Vec<Vec<f32>> = results.into_iter().flatten().collect();

        tracing::info!(
            texts = texts.len(),
            batches = texts.len().div_ceil(self.batch_size),
            "embedded texts"
        );
        Ok(vectors)
    }

    async fn health_check(&self) -> Result<(), EmbeddingError> {
        let url = format!("{}/models/{}", self.base_url, self.model);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ServerError { status, body });
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;
    use crate::observability::testing::RecordingHook;

    #[derive(Default)]
    struct FakeProvider {
        calls: AtomicU32,
        batch_sizes: Mutex<Vec<usize>>,
        /// Status returned for the first N calls before succeeding.
        fail_first: u32,
        fail_status: u16,
        delay: Option<Duration>,
    }

    /// Each embedding is `[char count of the input]`; items are returned in reverse order.
    async fn embeddings(
        State(state): State<Arc<FakeProvider>>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let call = state.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = state.delay {
            tokio::time::sleep(delay).await;
        }
        if call < state.fail_first {
            let status = StatusCode::from_u16(state.fail_status).unwrap();
            return (status, Json(json!({"error": "fake failure"})));
        }
        assert_eq!(
            headers.get("authorization").unwrap().to_str().unwrap(),
            "Bearer sk-test"
        );

        let inputs: Vec<String> = serde_json::from_value(body["input"].clone()).unwrap();
        state.batch_sizes.lock().unwrap().push(inputs.len());

        let data: Vec<Value> = inputs
            .iter()
            .enumerate()
            .rev()
            .map(|(i, text)| json!({"index": i, "embedding": [text.chars().count() as f32]}))
            .collect();
        (StatusCode::OK, Json(json!({"data": data, "model": body["model"]})))
    }

    async fn spawn_provider(state: Arc<FakeProvider>) -> String {
        let app = Router::new()
            .route("/v1/embeddings", post(embeddings))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn config(url: String, batch_size: u32) -> EmbeddingConfig {
        EmbeddingConfig {
            url,
            api_key: Some("sk-test".to_string()),
            batch_size,
            max_concurrent: 2,
            timeout_secs: 5,
            ..Default::default()
        }
    }

    fn client(config: &EmbeddingConfig) -> OpenAiEmbeddingsClient {
        OpenAiEmbeddingsClient::new(config)
            .unwrap()
            .with_retry_config(RetryConfig::new(3).with_initial_delay(Duration::from_millis(10)))
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_embed_batches_and_preserves_order() {
        let state = Arc::new(FakeProvider::default());
        let url = spawn_provider(state.clone()).await;
        let client = client(&config(url, 2));

        let vectors = client
            .embed(&texts(&["a", "bb", "ccc", "dddd", "eeeee"]))
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0], vec![5.0]]);
        let mut sizes = state.batch_sizes.lock().unwrap().clone();
        sizes.sort_unstable();
        assert_eq!(sizes, [1, 2, 2]);
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_request() {
        let state = Arc::new(FakeProvider::default());
        let url = spawn_provider(state.clone()).await;
        let client = client(&config(url, 2));

        assert!(client.embed(&[]).await.unwrap().is_empty());
        assert_eq!(state.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let state = Arc::new(FakeProvider {
            fail_first: 2,
            fail_status: 503,
            ..Default::default()
        });
        let url = spawn_provider(state.clone()).await;
        let client = client(&config(url, 10));

        let vectors = client.embed(&texts(&["hello"])).await.unwrap();

        assert_eq!(vectors, vec![vec![5.0]]);
        assert_eq!(state.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_client_errors() {
        let state = Arc::new(FakeProvider {
            fail_first: 5,
            fail_status: 400,
            ..Default::default()
        });
        let url = spawn_provider(state.clone()).await;
        let hook = Arc::new(RecordingHook::default());
        let client = client(&config(url, 10)).with_metrics_hook(hook.clone());

        let err = client.embed(&texts(&["hello"])).await.unwrap_err();

        assert!(matches!(err, EmbeddingError::ServerError { status: 400, .. }));
        assert_eq!(state.calls.load(Ordering::SeqCst), 1);
        assert_eq!(hook.counter_total(names::EMBEDDINGS_ERRORS_TOTAL), 1);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout_error() {
        let state = Arc::new(FakeProvider {
            delay: Some(Duration::from_secs(3)),
            ..Default::default()
        });
        let url = spawn_provider(state).await;
        let mut config = config(url, 10);
        config.timeout_secs = 1;
        let client = OpenAiEmbeddingsClient::new(&config)
            .unwrap()
            .with_retry_config(RetryConfig::new(1));

        let err = client.embed(&texts(&["hello"])).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Timeout));
    }

    #[tokio::test]
    async fn test_connection_refused_is_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = OpenAiEmbeddingsClient::new(&config(format!("http://{}", addr), 10))
            .unwrap()
            .with_retry_config(RetryConfig::new(1));

        let err = client.embed(&texts(&["hello"])).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::ConnectionError(_)));
    }

    #[tokio::test]
    async fn test_reports_metrics_per_batch() {
        let state = Arc::new(FakeProvider::default());
        let url = spawn_provider(state).await;
        let hook = Arc::new(RecordingHook::default());
        let client = client(&config(url, 2)).with_metrics_hook(hook.clone());

        client.embed(&texts(&["a", "b", "c"])).await.unwrap();

        assert_eq!(hook.counter_total(names::EMBEDDINGS_REQUESTS_TOTAL), 2);
        assert_eq!(hook.counter_total(names::EMBEDDINGS_ERRORS_TOTAL), 0);
        assert_eq!(hook.gauges.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_response_count_mismatch() {
        let response = EmbeddingsResponse {
            data: vec![EmbeddingData {
                index: 0,
                embedding: vec![0.1],
            }],
        };
        let err = into_ordered_vectors(response, 2).unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }

    #[test]
    fn test_missing_api_key() {
        let config = EmbeddingConfig {
            api_key: Some(String::new()),
            ..Default::default()
        };
        assert!(matches!(
            OpenAiEmbeddingsClient::new(&config),
            Err(EmbeddingError::ConfigError(_))
        ));
    }

    #[test]
    fn test_base_url_trimming() {
        let config = EmbeddingConfig {
            url: "http://localhost:8080/v1/".to_string(),
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let client = OpenAiEmbeddingsClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/v1");
    }
}
