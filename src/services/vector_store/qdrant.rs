//! Qdrant vector store backend implementation.
//!
//! All namespaces share one collection. Each point carries the namespace in
//! `_namespace` and the caller's id in `_id`; the point id itself is a UUIDv5
//! of `namespace:id`, so the same id can live in several namespaces.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_output::VectorsOptions;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, GetPointsBuilder, ListValue, PointId,
    PointStruct, Range, SearchPointsBuilder, Struct, UpsertPointsBuilder, Value as QdrantValue,
    VectorParamsBuilder, VectorsOutput,
};
use uuid::Uuid;

use super::{
    StoreMetrics, VectorStore, validate_delete, validate_items, validate_top_k, validate_vector,
};
use crate::error::VectorStoreError;
use crate::models::{Metadata, QueryResult, VectorItem, VectorStoreConfig};
use crate::observability::{SharedMetricsHook, names};

const BACKEND: &str = "qdrant";
const NAMESPACE_FIELD: &str = "_namespace";
const ID_FIELD: &str = "_id";

pub struct QdrantBackend {
    client: Qdrant,
    collection: String,
    dimension: usize,
    metrics: StoreMetrics,
}

impl QdrantBackend {
    pub fn new(config: &VectorStoreConfig, metrics: SharedMetricsHook) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            collection: config.collection.clone(),
            dimension: config.dimension as usize,
            metrics: StoreMetrics::new(metrics, names::QDRANT),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn count_matching(&self, filter: Filter) -> Result<u64, VectorStoreError> {
        let response = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection)
                    .filter(filter)
                    .exact(true),
            )
            .await
            .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;
        Ok(response.result.map_or(0, |r| r.count))
    }
}

/// Qdrant point id for `id` within `namespace`.
fn point_id(namespace: &str, id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{}:{}", namespace, id).as_bytes()).to_string()
}

fn to_qdrant_value(value: &serde_json::Value) -> QdrantValue {
    let kind = match value {
        serde_json::Value::Null => Kind::NullValue(0),
        serde_json::Value::Bool(b) => Kind::BoolValue(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        serde_json::Value::String(s) => Kind::StringValue(s.clone()),
        serde_json::Value::Array(items) => Kind::ListValue(ListValue {
            values: items.iter().map(to_qdrant_value).collect(),
        }),
        serde_json::Value::Object(map) => Kind::StructValue(Struct {
            fields: map
                .iter()
                .map(|(k, v)| (k.clone(), to_qdrant_value(v)))
                .collect(),
        }),
    };
    QdrantValue { kind: Some(kind) }
}

fn to_json_value(value: &QdrantValue) -> serde_json::Value {
    match &value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(*b),
        Some(Kind::IntegerValue(i)) => serde_json::Value::from(*i),
        Some(Kind::DoubleValue(d)) => serde_json::Number::from_f64(*d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s.clone()),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.iter().map(to_json_value).collect())
        }
        Some(Kind::StructValue(s)) => serde_json::Value::Object(
            s.fields
                .iter()
                .map(|(k, v)| (k.clone(), to_json_value(v)))
                .collect(),
        ),
    }
}

/// `_namespace` and `_id` belong to the store; metadata may not set them.
fn check_reserved_keys(items: &[VectorItem]) -> Result<(), VectorStoreError> {
    for item in items {
        if let Some(key) = [NAMESPACE_FIELD, ID_FIELD]
            .into_iter()
            .find(|key| item.metadata.contains_key(*key))
        {
            return Err(VectorStoreError::InvalidArgument(format!(
                "metadata key '{}' is reserved (item '{}')",
                key, item.id
            )));
        }
    }
    Ok(())
}

fn build_payload(namespace: &str, item: &VectorItem) -> HashMap<String, QdrantValue> {
    let mut payload: HashMap<String, QdrantValue> = item
        .metadata
        .iter()
        .map(|(k, v)| (k.clone(), to_qdrant_value(v)))
        .collect();
    payload.insert(NAMESPACE_FIELD.to_string(), namespace.to_string().into());
    payload.insert(ID_FIELD.to_string(), item.id.clone().into());
    payload
}

/// Split a stored payload into the caller's id and metadata.
fn split_payload(payload: &HashMap<String, QdrantValue>) -> (String, Metadata) {
    let id = match payload.get(ID_FIELD).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => s.clone(),
        _ => String::new(),
    };
    let metadata = payload
        .iter()
        .filter(|(k, _)| k.as_str() != ID_FIELD && k.as_str() != NAMESPACE_FIELD)
        .map(|(k, v)| (k.clone(), to_json_value(v)))
        .collect();
    (id, metadata)
}

fn filter_condition(key: &str, value: &serde_json::Value) -> Result<Condition, VectorStoreError> {
    match value {
        serde_json::Value::String(s) => Ok(Condition::matches(key, s.clone())),
        serde_json::Value::Bool(b) => Ok(Condition::matches(key, *b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Condition::matches(key, i)),
            None => {
                let f = n.as_f64().unwrap_or_default();
                Ok(Condition::range(
                    key,
                    Range {
                        gte: Some(f),
                        lte: Some(f),
                        ..Default::default()
                    },
                ))
            }
        },
        serde_json::Value::Null => Ok(Condition::is_null(key)),
        other => Err(VectorStoreError::InvalidArgument(format!(
            "unsupported filter value for '{}': {}",
            key, other
        ))),
    }
}

/// Namespace condition, optional point-id condition, then one condition per filter entry.
fn build_filter(
    namespace: &str,
    ids: &[String],
    filters: Option<&Metadata>,
) -> Result<Filter, VectorStoreError> {
    let mut must = vec![Condition::matches(NAMESPACE_FIELD, namespace.to_string())];

    if !ids.is_empty() {
        must.push(Condition::has_id(
            ids.iter()
                .map(|id| PointId::from(point_id(namespace, id))),
        ));
    }

    for (key, value) in filters.into_iter().flatten() {
        must.push(filter_condition(key, value)?);
    }

    Ok(Filter::must(must))
}

#[allow(deprecated)]
fn extract_vector(vectors: Option<VectorsOutput>) -> Vec<f32> {
    match vectors.and_then(|v| v.vectors_options) {
        Some(VectorsOptions::Vector(v)) => v.data,
        _ => Vec::new(),
    }
}

#[async_trait]
impl VectorStore for QdrantBackend {
    async fn upsert(&self, namespace: &str, items: Vec<VectorItem>) -> Result<(), VectorStoreError> {
        if items.is_empty() {
            return Ok(());
        }
        validate_items(&items, self.dimension)?;
        check_reserved_keys(&items)?;

        let count = items.len();
        let points: Vec<PointStruct> = items
            .into_iter()
            .map(|item| {
                let payload = build_payload(namespace, &item);
                PointStruct::new(point_id(namespace, &item.id), item.vector, payload)
            })
            .collect();

        self.metrics
            .observe("upsert", async {
                self.client
                    .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
                    .await
                    .map(|_| ())
                    .map_err(|e| VectorStoreError::UpsertError(e.to_string()))
            })
            .await?;

        tracing::debug!(count, collection = %self.collection, "upserted vectors into qdrant");
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
        let filter = build_filter(namespace, &[], filters)?;

        let search = SearchPointsBuilder::new(&self.collection, vector.to_vec(), top_k as u64)
            .filter(filter)
            .with_payload(true);

        self.metrics
            .observe("query", async {
                let response = self
                    .client
                    .search_points(search)
                    .await
                    .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;

                Ok(response
                    .result
                    .into_iter()
                    .map(|point| {
                        let (id, metadata) = split_payload(&point.payload);
                        QueryResult {
                            id,
                            score: point.score,
                            metadata,
                        }
                    })
                    .collect())
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
        let filter = build_filter(namespace, ids, filters)?;

        self.metrics
            .observe("delete", async {
                // Qdrant doesn't report how many points a delete removed.
                let matching = self.count_matching(filter.clone()).await?;
                if matching == 0 {
                    return Ok(0);
                }

                self.client
                    .delete_points(
                        DeletePointsBuilder::new(&self.collection)
                            .points(filter)
                            .wait(true),
                    )
                    .await
                    .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;
                Ok(matching)
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

        let point_ids: Vec<PointId> = ids
            .iter()
            .map(|id| PointId::from(point_id(namespace, id)))
            .collect();

        self.metrics
            .observe("get", async {
                let response = self
                    .client
                    .get_points(
                        GetPointsBuilder::new(&self.collection, point_ids)
                            .with_payload(true)
                            .with_vectors(true),
                    )
                    .await
                    .map_err(|e| VectorStoreError::QueryError(e.to_string()))?;

                let mut found: HashMap<String, VectorItem> = response
                    .result
                    .into_iter()
                    .map(|point| {
                        let (id, metadata) = split_payload(&point.payload);
                        let item = VectorItem::new(id.clone(), extract_vector(point.vectors))
                            .with_metadata(metadata);
                        (id, item)
                    })
                    .collect();

                Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
            })
            .await
    }

    async fn count(&self, namespace: &str) -> Result<u64, VectorStoreError> {
        let filter = build_filter(namespace, &[], None)?;
        self.metrics
            .observe("count", self.count_matching(filter))
            .await
    }

    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;
        if exists {
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine),
                ),
            )
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        self.client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(
                &self.collection,
                NAMESPACE_FIELD,
                FieldType::Keyword,
            ))
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        tracing::info!(collection = %self.collection, dimension = self.dimension, "created qdrant collection");
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.client
            .health_check()
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
