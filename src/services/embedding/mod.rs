//! Embedding providers.
//!
//! Both providers take a batch of texts and return one vector per text in
//! input order. An empty batch never reaches the provider.

mod local;
mod openai;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EmbeddingError;
use crate::models::{EmbeddingConfig, EmbeddingProvider};
use crate::observability::SharedMetricsHook;

pub use local::LocalEmbeddingsClient;
pub use openai::OpenAiEmbeddingsClient;

#[async_trait]
pub trait EmbeddingsClient: Send + Sync {
    /// Embed `texts`, returning one vector per input in the same order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }

    async fn health_check(&self) -> Result<(), EmbeddingError>;

    fn backend_name(&self) -> &'static str;

    fn model(&self) -> &str;
}

pub type SharedEmbeddingsClient = Arc<dyn EmbeddingsClient>;

/// Build the provider selected by `config.provider`.
pub fn create_embeddings_client(
    config: &EmbeddingConfig,
    metrics: SharedMetricsHook,
) -> Result<SharedEmbeddingsClient, EmbeddingError> {
    let client: SharedEmbeddingsClient = match config.provider {
        EmbeddingProvider::OpenAi => {
            Arc::new(OpenAiEmbeddingsClient::new(config)?.with_metrics_hook(metrics))
        }
        EmbeddingProvider::Local => {
            Arc::new(LocalEmbeddingsClient::new(config)?.with_metrics_hook(metrics))
        }
    };
    tracing::info!(
        backend = client.backend_name(),
        model = client.model(),
        "embeddings client ready"
    );
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::noop_hook;

    #[test]
    fn test_factory_requires_api_key_for_openai() {
        let config = EmbeddingConfig {
            api_key: None,
            ..Default::default()
        };
        let err = create_embeddings_client(&config, noop_hook()).err().unwrap();
        assert!(matches!(err, EmbeddingError::ConfigError(_)));
    }

    #[test]
    fn test_factory_builds_openai_client() {
        let config = EmbeddingConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        };
        let client = create_embeddings_client(&config, noop_hook()).unwrap();
        assert_eq!(client.backend_name(), "openai");
        assert_eq!(client.model(), config.model);
    }

    #[test]
    fn test_factory_local_without_model_dir() {
        let config = EmbeddingConfig {
            provider: EmbeddingProvider::Local,
            model_path: None,
            ..Default::default()
        };
        let err = create_embeddings_client(&config, noop_hook()).err().unwrap();
        assert!(matches!(err, EmbeddingError::ConfigError(_)));
    }
}
