//! Chunk → embed → upsert for one batch of chunks.

use crate::error::IndexError;
use crate::models::{Chunk, VectorItem};
use crate::services::embedding::EmbeddingsClient;
use crate::services::vector_store::VectorStore;
use crate::utils::{RetryConfig, with_retry};

/// Metadata key holding the chunk text on stored items.
pub const TEXT_KEY: &str = "text";

/// Embed `chunks` and upsert them into `namespace`, keyed by `chunk_id`.
/// Returns the number of items written.
pub async fn process_batch(
    embeddings: &dyn EmbeddingsClient,
    store: &dyn VectorStore,
    namespace: &str,
    chunks: &[Chunk],
) -> Result<usize, IndexError> {
    if chunks.is_empty() {
        return Ok(0);
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embeddings.embed(&texts).await?;
    if vectors.len() != chunks.len() {
        return Err(IndexError::CountMismatch {
            expected: chunks.len(),
            actual: vectors.len(),
        });
    }

    let items: Vec<VectorItem> = chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| {
            let mut metadata = chunk.metadata.clone();
            metadata.insert(TEXT_KEY.to_string(), chunk.text.clone().into());
            VectorItem::new(chunk.chunk_id.clone(), vector).with_metadata(metadata)
        })
        .collect();

    let count = items.len();
    with_retry(&RetryConfig::default(), "vector upsert", || {
        let items = items.clone();
        async move { store.upsert(namespace, items).await }
    })
    .await
    .into_result()
    .map_err(IndexError::VectorStore)?;

    tracing::debug!(count, namespace, "indexed chunk batch");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::error::EmbeddingError;
    use crate::services::chunker::chunk_text;
    use crate::services::vector_store::SqliteBackend;

    /// Maps each text to `[char count, 1, 0]`.
    struct LengthEmbeddings {
        drop_last: bool,
    }

    #[async_trait]
    impl EmbeddingsClient for LengthEmbeddings {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let mut vectors: Vec<Vec<f32>> = texts
                .iter()
                .map(|t| vec![t.chars().count() as f32, 1.0, 0.0])
                .collect();
            if self.drop_last {
                vectors.pop();
            }
            Ok(vectors)
        }

        async fn health_check(&self) -> Result<(), EmbeddingError> {
            Ok(())
        }

        fn backend_name(&self) -> &'static str {
            "fake"
        }

        fn model(&self) -> &str {
            "length"
        }
    }

    #[tokio::test]
    async fn test_process_batch_stores_chunks_with_text() {
        let store = SqliteBackend::open_in_memory(3).unwrap();
        let metadata = json!({"source_id": "doc"}).as_object().cloned().unwrap();
        let chunks = chunk_text("abcdefghij", 4, 0, &metadata).unwrap();

        let written = process_batch(&LengthEmbeddings { drop_last: false }, &store, "ns", &chunks)
            .await
            .unwrap();

        assert_eq!(written, 3);
        assert_eq!(store.count("ns").await.unwrap(), 3);

        let stored = store
            .get_by_ids("ns", &["doc:8:10".to_string()])
            .await
            .unwrap();
        assert_eq!(stored[0].vector, vec![2.0, 1.0, 0.0]);
        assert_eq!(stored[0].metadata[TEXT_KEY], "ij");
        assert_eq!(stored[0].metadata["chunk_index"], 2);
    }

    #[tokio::test]
    async fn test_process_batch_empty() {
        let store = SqliteBackend::open_in_memory(3).unwrap();
        let written = process_batch(&LengthEmbeddings { drop_last: false }, &store, "ns", &[])
            .await
            .unwrap();
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn test_process_batch_detects_count_mismatch() {
        let store = SqliteBackend::open_in_memory(3).unwrap();
        let chunks = chunk_text("abcdefgh", 4, 0, &Default::default()).unwrap();

        let err = process_batch(&LengthEmbeddings { drop_last: true }, &store, "ns", &chunks)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            IndexError::CountMismatch {
                expected: 2,
                actual: 1
            }
        ));
        assert_eq!(store.count("ns").await.unwrap(), 0);
    }
}
