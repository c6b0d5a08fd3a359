use serde::{Deserialize, Serialize};

use super::vector::Metadata;

/// Metadata key read to build chunk ids.
pub const SOURCE_ID_KEY: &str = "source_id";

/// Metadata key added to every chunk.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// A window of source text produced by the chunker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `"{source_id}:{offset_start}:{offset_end}"`
    pub chunk_id: String,
    pub text: String,
    /// Character offset of the first character (inclusive).
    pub offset_start: usize,
    /// Character offset past the last character (exclusive).
    pub offset_end: usize,
    /// Source metadata plus `chunk_index`.
    pub metadata: Metadata,
}

impl Chunk {
    pub fn generate_id(source_id: &str, offset_start: usize, offset_end: usize) -> String {
        format!("{}:{}:{}", source_id, offset_start, offset_end)
    }

    pub fn chunk_index(&self) -> Option<u64> {
        self.metadata
            .get(CHUNK_INDEX_KEY)
            .and_then(serde_json::Value::as_u64)
    }

    pub fn char_len(&self) -> usize {
        self.offset_end - self.offset_start
    }
}
