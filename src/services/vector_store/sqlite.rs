//! SQLite vector store backed by the sqlite-vec extension.

use std::path::Path;
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use super::{
    StoreMetrics, VectorStore, validate_delete, validate_items, validate_top_k, validate_vector,
};
use crate::error::VectorStoreError;
use crate::models::{Metadata, QueryResult, VectorItem, VectorStoreConfig};
use crate::observability::{SharedMetricsHook, names, noop_hook};

const BACKEND: &str = "sqlite";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS vector_items (
    namespace TEXT NOT NULL,
    id TEXT NOT NULL,
    embedding BLOB NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (namespace, id)
);
"#;

static REGISTER_SQLITE_VEC: Once = Once::new();

/// Make `vec_*` functions available on every connection opened afterwards.
#[allow(clippy::missing_transmute_annotations)]
fn register_sqlite_vec() {
    REGISTER_SQLITE_VEC.call_once(|| {
        // SAFETY: sqlite3_vec_init has the signature sqlite3_auto_extension expects.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
        }
    });
}

pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    dimension: usize,
    metrics: StoreMetrics,
}

impl SqliteBackend {
    /// Open the database at `config.path`, defaulting to `vectors.db` in the data dir.
    pub fn new(config: &VectorStoreConfig, metrics: SharedMetricsHook) -> Result<Self, VectorStoreError> {
        let path = config.resolved_path().ok_or_else(|| {
            VectorStoreError::ConnectionError("could not determine SQLite database path".to_string())
        })?;
        tracing::debug!(path = %path.display(), "opening sqlite vector store");
        let backend = Self::open(&path, config.dimension as usize)?;
        Ok(backend.with_metrics_hook(metrics))
    }

    pub fn open(path: &Path, dimension: usize) -> Result<Self, VectorStoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;
        }
        register_sqlite_vec();
        let conn = Connection::open(path).map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| VectorStoreError::SqliteError(e.to_string()))?;
        Self::init(conn, dimension)
    }

    pub fn open_in_memory(dimension: usize) -> Result<Self, VectorStoreError> {
        register_sqlite_vec();
        let conn = Connection::open_in_memory()
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;
        Self::init(conn, dimension)
    }

    fn init(conn: Connection, dimension: usize) -> Result<Self, VectorStoreError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            dimension,
            metrics: StoreMetrics::new(noop_hook(), names::SQLITE),
        })
    }

    pub fn with_metrics_hook(mut self, hook: SharedMetricsHook) -> Self {
        self.metrics = StoreMetrics::new(hook, names::SQLITE);
        self
    }

    /// Run `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, VectorStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, VectorStoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| VectorStoreError::SqliteError("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| VectorStoreError::SqliteError(format!("blocking task failed: {}", e)))?
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn decode_metadata(text: &str) -> Result<Metadata, VectorStoreError> {
    serde_json::from_str(text).map_err(|e| VectorStoreError::QueryError(format!("bad metadata: {}", e)))
}

/// `json_extract` conditions for exact-match metadata filters, with their bind values.
fn filter_clauses(filters: Option<&Metadata>) -> Result<(Vec<String>, Vec<SqlValue>), VectorStoreError> {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    for (key, value) in filters.into_iter().flatten() {
        if key.contains('"') {
            return Err(VectorStoreError::InvalidArgument(format!(
                "filter key must not contain quotes: {}",
                key
            )));
        }
        let path = SqlValue::Text(format!("$.\"{}\"", key));

        let bound = match value {
            serde_json::Value::Null => {
                clauses.push("json_extract(metadata, ?) IS NULL".to_string());
                values.push(path);
                continue;
            }
            serde_json::Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => SqlValue::Text(s.clone()),
            // json_extract returns minified JSON text for containers
            other => SqlValue::Text(other.to_string()),
        };
        clauses.push("json_extract(metadata, ?) = ?".to_string());
        values.push(path);
        values.push(bound);
    }

    Ok((clauses, values))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[async_trait]
impl VectorStore for SqliteBackend {
    async fn upsert(&self, namespace: &str, items: Vec<VectorItem>) -> Result<(), VectorStoreError> {
        if items.is_empty() {
            return Ok(());
        }
        validate_items(&items, self.dimension)?;

        let namespace = namespace.to_string();
        let count = items.len();
        self.metrics
            .observe(
                "upsert",
                self.with_conn(move |conn| {
                    let tx = conn
                        .transaction()
                        .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;
                    {
                        let mut stmt = tx
                            .prepare(
                                "INSERT INTO vector_items (namespace, id, embedding, metadata)
                                 VALUES (?1, ?2, ?3, ?4)
                                 ON CONFLICT (namespace, id) DO UPDATE SET
                                     embedding = excluded.embedding,
                                     metadata = excluded.metadata",
                            )
                            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;
                        for item in &items {
                            let metadata = serde_json::Value::Object(item.metadata.clone()).to_string();
                            stmt.execute(params![
                                namespace,
                                item.id,
                                encode_vector(&item.vector),
                                metadata
                            ])
                            .map_err(|e| VectorStoreError::UpsertError(e.to_string()))?;
                        }
                    }
                    tx.commit()
                        .map_err(|e| VectorStoreError::UpsertError(e.to_string()))
                }),
            )
            .await?;

        tracing::debug!(count, "upserted vectors into sqlite");
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
        let (clauses, filter_values) = filter_clauses(filters)?;

        let mut sql = String::from(
            "SELECT id, metadata, vec_distance_cosine(embedding, ?) AS distance
             FROM vector_items WHERE namespace = ?",
        );
        for clause in &clauses {
            sql.push_str(" AND ");
            sql.push_str(clause);
        }
        sql.push_str(" ORDER BY distance ASC LIMIT ?");

        let mut values = vec![
            SqlValue::Blob(encode_vector(vector)),
            SqlValue::Text(namespace.to_string()),
        ];
        values.extend(filter_values);
        values.push(SqlValue::Integer(top_k as i64));

        self.metrics
            .observe(
                "query",
                self.with_conn(move |conn| {
                    let mut stmt = conn
                        .prepare(&sql)
                        .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;
                    let rows = stmt
                        .query_map(params_from_iter(values), |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, Option<f64>>(2)?,
                            ))
                        })
                        .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;

                    let mut results = Vec::new();
                    for row in rows {
                        let (id, metadata, distance) =
                            row.map_err(|e| VectorStoreError::QueryError(e.to_string()))?;
                        // zero-norm embeddings have no cosine distance
                        let Some(distance) = distance else {
                            continue;
                        };
                        results.push(QueryResult {
                            id,
                            score: (1.0 - distance) as f32,
                            metadata: decode_metadata(&metadata)?,
                        });
                    }
                    Ok(results)
                }),
            )
            .await
    }

    async fn delete(
        &self,
        namespace: &str,
        ids: &[String],
        filters: Option<&Metadata>,
    ) -> Result<u64, VectorStoreError> {
        validate_delete(ids, filters)?;
        let (clauses, filter_values) = filter_clauses(filters)?;

        let mut sql = String::from("DELETE FROM vector_items WHERE namespace = ?");
        let mut values = vec![SqlValue::Text(namespace.to_string())];
        if !ids.is_empty() {
            sql.push_str(&format!(" AND id IN ({})", placeholders(ids.len())));
            values.extend(ids.iter().cloned().map(SqlValue::Text));
        }
        for clause in &clauses {
            sql.push_str(" AND ");
            sql.push_str(clause);
        }
        values.extend(filter_values);

        let deleted = self
            .metrics
            .observe(
                "delete",
                self.with_conn(move |conn| {
                    conn.execute(&sql, params_from_iter(values))
                        .map_err(|e| VectorStoreError::DeleteError(e.to_string()))
                }),
            )
            .await?;
        Ok(deleted as u64)
    }

    async fn get_by_ids(
        &self,
        namespace: &str,
        ids: &[String],
    ) -> Result<Vec<VectorItem>, VectorStoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, embedding, metadata FROM vector_items WHERE namespace = ? AND id IN ({})",
            placeholders(ids.len())
        );
        let mut values = vec![SqlValue::Text(namespace.to_string())];
        values.extend(ids.iter().cloned().map(SqlValue::Text));
        let requested = ids.to_vec();

        self.metrics
            .observe(
                "get",
                self.with_conn(move |conn| {
                    let mut stmt = conn
                        .prepare(&sql)
                        .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;
                    let rows = stmt
                        .query_map(params_from_iter(values), |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, Vec<u8>>(1)?,
                                row.get::<_, String>(2)?,
                            ))
                        })
                        .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;

                    let mut found = std::collections::HashMap::new();
                    for row in rows {
                        let (id, blob, metadata) =
                            row.map_err(|e| VectorStoreError::QueryError(e.to_string()))?;
                        let item = VectorItem::new(id.clone(), decode_vector(&blob))
                            .with_metadata(decode_metadata(&metadata)?);
                        found.insert(id, item);
                    }
                    // Keep the caller's order; unknown ids are skipped.
                    Ok(requested
                        .iter()
                        .filter_map(|id| found.remove(id))
                        .collect())
                }),
            )
            .await
    }

    async fn count(&self, namespace: &str) -> Result<u64, VectorStoreError> {
        let namespace = namespace.to_string();
        self.metrics
            .observe(
                "count",
                self.with_conn(move |conn| {
                    conn.query_row(
                        "SELECT COUNT(*) FROM vector_items WHERE namespace = ?1",
                        params![namespace],
                        |row| row.get::<_, i64>(0),
                    )
                    .map(|n| n as u64)
                    .map_err(|e| VectorStoreError::QueryError(e.to_string()))
                }),
            )
            .await
    }

    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        self.with_conn(|conn| {
            conn.execute_batch(SCHEMA)
                .map_err(|e| VectorStoreError::CollectionError(e.to_string()))
        })
        .await
    }

    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0))
                .optional()
                .map(|v| v.is_some())
                .map_err(|e| VectorStoreError::SqliteError(e.to_string()))
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::observability::testing::RecordingHook;

    const NS: &str = "docs";

    fn meta(value: serde_json::Value) -> Metadata {
        value.as_object().cloned().unwrap()
    }

    fn store() -> SqliteBackend {
        SqliteBackend::open_in_memory(3).unwrap()
    }

    fn items() -> Vec<VectorItem> {
        vec![
            VectorItem::new("a", vec![1.0, 0.0, 0.0]).with_metadata(meta(json!({"lang": "en", "page": 1}))),
            VectorItem::new("b", vec![0.0, 1.0, 0.0]).with_metadata(meta(json!({"lang": "de", "page": 2}))),
            VectorItem::new("c", vec![0.7, 0.7, 0.0]).with_metadata(meta(json!({"lang": "en", "draft": true}))),
        ]
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_query_returns_self_first() {
        let store = store();
        store.upsert(NS, items()).await.unwrap();

        let results = store.query(NS, &[1.0, 0.0, 0.0], 3, None).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "a");
        assert!(results[0].score >= 1.0 - 1e-4);
        assert_eq!(results[1].id, "c");
        assert_eq!(results[0].metadata["lang"], "en");
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_query_respects_top_k_and_filters() {
        let store = store();
        store.upsert(NS, items()).await.unwrap();

        let top1 = store.query(NS, &[0.0, 1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(top1.len(), 1);
        assert_eq!(top1[0].id, "b");

        let english = meta(json!({"lang": "en"}));
        let results = store
            .query(NS, &[0.0, 1.0, 0.0], 10, Some(&english))
            .await
            .unwrap();
        let found: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(found, ["c", "a"]);

        let typed = meta(json!({"page": 2}));
        let results = store.query(NS, &[1.0, 0.0, 0.0], 10, Some(&typed)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "b");

        let flagged = meta(json!({"draft": true}));
        let results = store.query(NS, &[1.0, 0.0, 0.0], 10, Some(&flagged)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "c");
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = store();
        store.upsert(NS, items()).await.unwrap();
        store
            .upsert("other", vec![VectorItem::new("a", vec![0.0, 0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(store.count(NS).await.unwrap(), 3);
        assert_eq!(store.count("other").await.unwrap(), 1);

        let results = store.query("other", &[1.0, 0.0, 0.0], 5, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "a");
        assert!(results[0].score.abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let store = store();
        store.upsert(NS, items()).await.unwrap();
        store
            .upsert(
                NS,
                vec![VectorItem::new("a", vec![0.0, 0.0, 1.0]).with_metadata(meta(json!({"v": 2})))],
            )
            .await
            .unwrap();

        assert_eq!(store.count(NS).await.unwrap(), 3);
        let fetched = store.get_by_ids(NS, &ids(&["a"])).await.unwrap();
        assert_eq!(fetched[0].vector, vec![0.0, 0.0, 1.0]);
        assert_eq!(fetched[0].metadata, meta(json!({"v": 2})));
    }

    #[tokio::test]
    async fn test_get_by_ids_keeps_requested_order() {
        let store = store();
        store.upsert(NS, items()).await.unwrap();

        let fetched = store.get_by_ids(NS, &ids(&["c", "missing", "a"])).await.unwrap();
        let found: Vec<_> = fetched.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(found, ["c", "a"]);
        assert_eq!(fetched[1].vector, vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_delete_by_ids_and_filters() {
        let store = store();
        store.upsert(NS, items()).await.unwrap();
        store.upsert("other", items()).await.unwrap();

        assert_eq!(store.delete(NS, &ids(&["a", "zzz"]), None).await.unwrap(), 1);

        let english = meta(json!({"lang": "en"}));
        assert_eq!(store.delete(NS, &[], Some(&english)).await.unwrap(), 1);

        // Both selectors must match.
        let german = meta(json!({"lang": "de"}));
        assert_eq!(store.delete("other", &ids(&["a"]), Some(&german)).await.unwrap(), 0);

        assert_eq!(store.count(NS).await.unwrap(), 1);
        assert_eq!(store.count("other").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let store = store();

        let err = store.query(NS, &[1.0, 0.0, 0.0], 0, None).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::InvalidArgument(_)));

        let err = store.query(NS, &[1.0, 0.0], 1, None).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::InvalidArgument(_)));

        let err = store.delete(NS, &[], None).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::InvalidArgument(_)));

        let err = store
            .upsert(NS, vec![VectorItem::new("x", vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_zero_vector_rejected_and_query_unaffected() {
        let store = store();
        store.upsert(NS, items()).await.unwrap();

        let err = store
            .upsert(NS, vec![VectorItem::new("zero", vec![0.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::InvalidArgument(_)));

        let err = store.query(NS, &[0.0, 0.0, 0.0], 3, None).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::InvalidArgument(_)));

        let results = store.query(NS, &[1.0, 0.0, 0.0], 3, None).await.unwrap();
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn test_query_skips_rows_without_distance() {
        let store = store();
        store.upsert(NS, items()).await.unwrap();
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO vector_items (namespace, id, embedding, metadata) VALUES (?1, ?2, ?3, '{}')",
                    params![NS, "legacy-zero", encode_vector(&[0.0, 0.0, 0.0])],
                )
                .map_err(|e| VectorStoreError::UpsertError(e.to_string()))
            })
            .await
            .unwrap();

        let results = store.query(NS, &[1.0, 0.0, 0.0], 10, None).await.unwrap();
        let found: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(found.len(), 3);
        assert!(!found.contains(&"legacy-zero"));
    }

    #[tokio::test]
    async fn test_empty_upsert_is_noop() {
        let hook = Arc::new(RecordingHook::default());
        let store = store().with_metrics_hook(hook.clone());

        store.upsert(NS, Vec::new()).await.unwrap();

        assert_eq!(store.count(NS).await.unwrap(), 0);
        assert_eq!(hook.counter_total(names::SQLITE_OPERATIONS_TOTAL), 1);
    }

    #[tokio::test]
    async fn test_reports_metrics() {
        let hook = Arc::new(RecordingHook::default());
        let store = store().with_metrics_hook(hook.clone());

        store.upsert(NS, items()).await.unwrap();
        store.query(NS, &[1.0, 0.0, 0.0], 1, None).await.unwrap();
        store.delete(NS, &ids(&["a"]), None).await.unwrap();

        assert_eq!(
            hook.latency_names(),
            [
                names::SQLITE_UPSERT_DURATION,
                names::SQLITE_QUERY_DURATION,
                names::SQLITE_DELETE_DURATION
            ]
        );
        assert_eq!(hook.counter_total(names::SQLITE_OPERATIONS_TOTAL), 3);
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors").join("store.db");

        {
            let store = SqliteBackend::open(&path, 3).unwrap();
            store.upsert(NS, items()).await.unwrap();
        }

        let reopened = SqliteBackend::open(&path, 3).unwrap();
        reopened.ensure_collection().await.unwrap();
        assert_eq!(reopened.count(NS).await.unwrap(), 3);
        assert!(reopened.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_configured_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = VectorStoreConfig {
            path: Some(dir.path().join("vectors.db")),
            dimension: 3,
            ..Default::default()
        };

        SqliteBackend::new(&config, noop_hook())
            .unwrap()
            .upsert(NS, items())
            .await
            .unwrap();

        let reopened = SqliteBackend::new(&config, noop_hook()).unwrap();
        assert_eq!(reopened.count(NS).await.unwrap(), 3);
    }

    #[test]
    fn test_vector_blob_encoding() {
        let vector = vec![0.25, -1.5, 3.0];
        let blob = encode_vector(&vector);
        assert_eq!(blob.len(), 12);
        assert_eq!(decode_vector(&blob), vector);
    }

    #[test]
    fn test_filter_clauses_bind_typed_values() {
        let filters = meta(json!({"flag": false, "n": 3, "x": 1.5, "s": "v", "none": null}));
        let (clauses, values) = filter_clauses(Some(&filters)).unwrap();

        assert_eq!(clauses.len(), 5);
        assert_eq!(values.len(), 9);
        assert!(values.contains(&SqlValue::Integer(0)));
        assert!(values.contains(&SqlValue::Integer(3)));
        assert!(values.contains(&SqlValue::Real(1.5)));
        assert!(values.contains(&SqlValue::Text("v".to_string())));
        assert!(values.contains(&SqlValue::Text("$.\"none\"".to_string())));

        let bad = meta(json!({"a\"b": 1}));
        assert!(filter_clauses(Some(&bad)).is_err());
    }
}
