//! Items stored in and returned from vector stores.

use serde::{Deserialize, Serialize};

/// Free-form JSON metadata attached to chunks and vectors.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A vector with its id and metadata. Ids are unique within a namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorItem {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl VectorItem {
    pub fn new(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            vector,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A single similarity query hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: String,
    /// Cosine similarity; 1.0 for an identical direction.
    pub score: f32,
    pub metadata: Metadata,
}

/// Returns true when every filter entry equals the metadata value at the same key.
pub fn metadata_matches(metadata: &Metadata, filters: &Metadata) -> bool {
    filters
        .iter()
        .all(|(key, expected)| metadata.get(key) == Some(expected))
}
