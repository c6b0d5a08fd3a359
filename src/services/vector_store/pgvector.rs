use std::time::Duration;

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;

use super::{
    StoreMetrics, VectorStore, validate_delete, validate_items, validate_top_k, validate_vector,
};
use crate::error::VectorStoreError;
use crate::models::{Metadata, QueryResult, VectorItem, VectorStoreConfig};
use crate::observability::{SharedMetricsHook, names};

const BACKEND: &str = "pgvector";
const TABLE: &str = "vector_items";

pub struct PgVectorBackend {
    pool: PgPool,
    dimension: usize,
    metrics: StoreMetrics,
}

impl PgVectorBackend {
    pub async fn new(
        config: &VectorStoreConfig,
        metrics: SharedMetricsHook,
    ) -> Result<Self, VectorStoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(config.pool_min)
            .max_connections(config.pool_max)
            .acquire_timeout(Duration::from_secs(config.pool_acquire_timeout.into()))
            .connect(&config.url)
            .await
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        let backend = Self {
            pool,
            dimension: config.dimension as usize,
            metrics: StoreMetrics::new(metrics, names::PGVECTOR),
        };

        backend.check_pgvector_extension().await?;

        tracing::info!(
            pool_min = config.pool_min,
            pool_max = config.pool_max,
            "connected to PostgreSQL"
        );
        Ok(backend)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn check_pgvector_extension(&self) -> Result<(), VectorStoreError> {
        let result: Option<(String,)> =
            sqlx::query_as("SELECT extname FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        if result.is_none() {
            return Err(VectorStoreError::PgVectorExtensionError(
                "pgvector extension is not installed. Run: CREATE EXTENSION vector;".to_string(),
            ));
        }

        Ok(())
    }
}

/// `metadata ->> key = text` conditions numbered from `$first_param`, with the
/// (key, text) pairs to bind in order.
fn filter_conditions(
    filters: Option<&Metadata>,
    first_param: usize,
) -> (Vec<String>, Vec<(String, String)>) {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();
    let mut param = first_param;

    for (key, value) in filters.into_iter().flatten() {
        conditions.push(format!("metadata ->> ${} = ${}", param, param + 1));
        param += 2;
        binds.push((key.clone(), filter_text(value)));
    }

    (conditions, binds)
}

/// Text form `->>` yields for a JSON value.
fn filter_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn where_clause(conditions: &[String]) -> String {
    conditions.join(" AND ")
}

#[async_trait]
impl VectorStore for PgVectorBackend {
    async fn upsert(&self, namespace: &str, items: Vec<VectorItem>) -> Result<(), VectorStoreError> {
        if items.is_empty() {
            return Ok(());
        }
        validate_items(&items, self.dimension)?;

        let query = format!(
            r#"
            INSERT INTO {} (namespace, id, embedding, metadata)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (namespace, id) DO UPDATE SET
                embedding = EXCLUDED.embedding,
                metadata = EXCLUDED.metadata
            "#,
            TABLE
        );
        let count = items.len();

        self.metrics
            .observe("upsert", async {
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;

                for item in items {
                    sqlx::query(&query)
                        .bind(namespace)
                        .bind(&item.id)
                        .bind(Vector::from(item.vector))
                        .bind(Json(&item.metadata))
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;
                }

                tx.commit()
                    .await
                    .map_err(|e| VectorStoreError::UpsertError(e.to_string()))
            })
            .await?;

        tracing::debug!(count, "upserted vectors into pgvector");
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        filters: Option<&Metadata>,
    ) -> Result<Vec<QueryResult>, VectorStoreError> {
        validate_top_k(top_k)?;
        validate_vector(vector, self.dimension)?;

        // $1 = query vector, $2 = namespace, $3 = limit, filters from $4
        let (filter_sql, binds) = filter_conditions(filters, 4);
        let mut conditions = vec!["namespace = $2".to_string()];
        conditions.extend(filter_sql);

        let query = format!(
            r#"
            SELECT id, 1 - (embedding <=> $1) AS score, metadata
            FROM {}
            WHERE {}
            ORDER BY embedding <=> $1
            LIMIT $3
            "#,
            TABLE,
            where_clause(&conditions)
        );

        let embedding = Vector::from(vector.to_vec());

        self.metrics
            .observe("query", async {
                let mut query_builder = sqlx::query(&query)
                    .bind(&embedding)
                    .bind(namespace)
                    .bind(top_k as i64);
                for (key, value) in &binds {
                    query_builder = query_builder.bind(key).bind(value);
                }

                let rows = query_builder
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;

                rows.into_iter()
                    .map(|row: PgRow| {
                        let score: f64 = row
                            .try_get("score")
                            .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;
                        let metadata: Json<Metadata> = row
                            .try_get("metadata")
                            .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;
                        Ok(QueryResult {
                            id: row
                                .try_get("id")
                                .map_err(|e| VectorStoreError::QueryError(e.to_string()))?,
                            score: score as f32,
                            metadata: metadata.0,
                        })
                    })
                    .collect()
            })
            .await
    }

    async fn delete(
        &self,
        namespace: &str,
        ids: &[String],
        filters: Option<&Metadata>,
    ) -> Result<u64, VectorStoreError> {
        validate_delete(ids, filters)?;

        // $1 = namespace, $2 = ids (when given), filters follow
        let mut conditions = vec!["namespace = $1".to_string()];
        let mut next_param = 2;
        if !ids.is_empty() {
            conditions.push("id = ANY($2)".to_string());
            next_param = 3;
        }
        let (filter_sql, binds) = filter_conditions(filters, next_param);
        conditions.extend(filter_sql);

        let query = format!("DELETE FROM {} WHERE {}", TABLE, where_clause(&conditions));

        self.metrics
            .observe("delete", async {
                let mut query_builder = sqlx::query(&query).bind(namespace);
                if !ids.is_empty() {
                    query_builder = query_builder.bind(ids);
                }
                for (key, value) in &binds {
                    query_builder = query_builder.bind(key).bind(value);
                }

                query_builder
                    .execute(&self.pool)
                    .await
                    .map(|result| result.rows_affected())
                    .map_err(|e| VectorStoreError::DeleteError(e.to_string()))
            })
            .await
    }

    async fn get_by_ids(
        &self,
        namespace: &str,
        ids: &[String],
    ) -> Result<Vec<VectorItem>, VectorStoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!(
            "SELECT id, embedding, metadata FROM {} WHERE namespace = $1 AND id = ANY($2) \
             ORDER BY array_position($2, id)",
            TABLE
        );

        self.metrics
            .observe("get", async {
                let rows = sqlx::query(&query)
                    .bind(namespace)
                    .bind(ids)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;

                rows.into_iter()
                    .map(|row: PgRow| {
                        let id: String = row
                            .try_get("id")
                            .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;
                        let embedding: Vector = row
                            .try_get("embedding")
                            .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;
                        let metadata: Json<Metadata> = row
                            .try_get("metadata")
                            .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;
                        Ok(VectorItem::new(id, embedding.to_vec()).with_metadata(metadata.0))
                    })
                    .collect()
            })
            .await
    }

    async fn count(&self, namespace: &str) -> Result<u64, VectorStoreError> {
        let query = format!("SELECT COUNT(*) FROM {} WHERE namespace = $1", TABLE);

        self.metrics
            .observe("count", async {
                let row: (i64,) = sqlx::query_as(&query)
                    .bind(namespace)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;
                Ok(row.0 as u64)
            })
            .await
    }

    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        let statements = [
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    namespace TEXT NOT NULL,
                    id TEXT NOT NULL,
                    embedding vector({}) NOT NULL,
                    metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                    PRIMARY KEY (namespace, id)
                )
                "#,
                TABLE, self.dimension
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {0}_embedding_idx ON {0} USING hnsw (embedding vector_cosine_ops)",
                TABLE
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {0}_metadata_idx ON {0} USING GIN (metadata)",
                TABLE
            ),
        ];

        for statement in &statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;
        }

        Ok(())
    }

    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
