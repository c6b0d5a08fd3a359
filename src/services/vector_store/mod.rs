//! Vector store abstraction layer.
//!
//! Every operation is scoped to a namespace, so one table or collection can
//! hold several independent id spaces. Backends rank by cosine similarity and
//! report `score = 1 - cosine_distance`.

mod pgvector;
mod qdrant;
mod sqlite;

pub use pgvector::PgVectorBackend;
pub use qdrant::QdrantBackend;
pub use sqlite::SqliteBackend;

use std::future::Future;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::VectorStoreError;
use crate::models::{Metadata, QueryResult, VectorDriver, VectorItem, VectorStoreConfig};
use crate::observability::names::StoreMetricNames;
use crate::observability::{SharedMetricsHook, elapsed_ms};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace items by id. An empty batch is a no-op.
    async fn upsert(&self, namespace: &str, items: Vec<VectorItem>) -> Result<(), VectorStoreError>;

    /// Nearest `top_k` items to `vector`, best first. `filters` are exact metadata matches.
    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filters: Option<&Metadata>,
    ) -> Result<Vec<QueryResult>, VectorStoreError>;

    /// Delete items matching all of `ids` (when non-empty) and `filters` (when given).
    /// Returns the number of items removed.
    async fn delete(
        &self,
        namespace: &str,
        ids: &[String],
        filters: Option<&Metadata>,
    ) -> Result<u64, VectorStoreError>;

    async fn get_by_ids(
        &self,
        namespace: &str,
        ids: &[String],
    ) -> Result<Vec<VectorItem>, VectorStoreError>;

    async fn count(&self, namespace: &str) -> Result<u64, VectorStoreError>;

    /// Create the table or collection if it doesn't exist.
    async fn ensure_collection(&self) -> Result<(), VectorStoreError>;

    async fn health_check(&self) -> Result<bool, VectorStoreError>;

    fn backend_name(&self) -> &'static str;

    fn dimension(&self) -> usize;
}

/// Create a vector store backend based on configuration.
pub async fn create_backend(
    config: &VectorStoreConfig,
    metrics: SharedMetricsHook,
) -> Result<Box<dyn VectorStore>, VectorStoreError> {
    let backend: Box<dyn VectorStore> = match config.driver {
        VectorDriver::Qdrant => Box::new(QdrantBackend::new(config, metrics)?),
        VectorDriver::Postgres => Box::new(PgVectorBackend::new(config, metrics).await?),
        VectorDriver::Sqlite => Box::new(SqliteBackend::new(config, metrics)?),
    };
    tracing::info!(
        backend = backend.backend_name(),
        dimension = backend.dimension(),
        "vector store ready"
    );
    Ok(backend)
}

pub(crate) fn validate_top_k(top_k: usize) -> Result<(), VectorStoreError> {
    if top_k < 1 {
        return Err(VectorStoreError::InvalidArgument(
            "top_k must be at least 1".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_delete(
    ids: &[String],
    filters: Option<&Metadata>,
) -> Result<(), VectorStoreError> {
    if ids.is_empty() && filters.is_none_or(|f| f.is_empty()) {
        return Err(VectorStoreError::InvalidArgument(
            "delete requires ids or filters".to_string(),
        ));
    }
    Ok(())
}

/// Dimension must match, and the vector needs a finite, non-zero norm for
/// cosine distance to be defined.
pub(crate) fn validate_vector(vector: &[f32], expected: usize) -> Result<(), VectorStoreError> {
    if vector.len() != expected {
        return Err(VectorStoreError::InvalidArgument(format!(
            "vector dimension {} does not match configured dimension {}",
            vector.len(),
            expected
        )));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(VectorStoreError::InvalidArgument(
            "vector contains NaN or infinite values".to_string(),
        ));
    }
    if vector.iter().all(|x| *x == 0.0) {
        return Err(VectorStoreError::InvalidArgument(
            "zero vector has no cosine similarity".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_items(items: &[VectorItem], expected: usize) -> Result<(), VectorStoreError> {
    for item in items {
        if item.id.is_empty() {
            return Err(VectorStoreError::InvalidArgument(
                "item id must not be empty".to_string(),
            ));
        }
        validate_vector(&item.vector, expected)?;
    }
    Ok(())
}

/// Latency and counter reporting shared by the backends.
#[derive(Clone)]
pub(crate) struct StoreMetrics {
    hook: SharedMetricsHook,
    names: StoreMetricNames,
}

impl StoreMetrics {
    pub(crate) fn new(hook: SharedMetricsHook, names: StoreMetricNames) -> Self {
        Self { hook, names }
    }

    /// Await `fut`, recording its duration (upsert/query/delete only), the
    /// operation counter and, on failure, the error counter.
    pub(crate) async fn observe<T, F>(
        &self,
        operation: &'static str,
        fut: F,
    ) -> Result<T, VectorStoreError>
    where
        F: Future<Output = Result<T, VectorStoreError>>,
    {
        let start = Instant::now();
        let result = fut.await;
        let labels = [("operation", operation)];

        let duration_name = match operation {
            "upsert" => Some(self.names.upsert_duration),
            "query" => Some(self.names.query_duration),
            "delete" => Some(self.names.delete_duration),
            _ => None,
        };
        if let Some(name) = duration_name {
            self.hook.record_latency(name, elapsed_ms(start), &labels);
        }
        self.hook.increment(self.names.operations_total, 1, &labels);

        if let Err(ref e) = result {
            self.hook.increment(self.names.errors_total, 1, &labels);
            tracing::debug!(operation, error = %e, "vector store operation failed");
        }
        result
    }
}
