mod chunk;
mod config;
mod search;
mod vector;

pub use chunk::{CHUNK_INDEX_KEY, Chunk, SOURCE_ID_KEY};
pub use config::{
    ChunkingConfig, Config, DEFAULT_ANTHROPIC_MODEL, DEFAULT_ANTHROPIC_URL, DEFAULT_COLLECTION,
    DEFAULT_EMBEDDING_DIMENSION, DEFAULT_METRICS_RETENTION_DAYS, DEFAULT_NAMESPACE,
    DEFAULT_OPENAI_CHAT_MODEL, DEFAULT_OPENAI_MODEL, DEFAULT_OPENAI_URL, DEFAULT_POSTGRES_URL,
    DEFAULT_QDRANT_URL, EmbeddingConfig, EmbeddingProvider, LlmConfig, LlmProvider, MetricsConfig,
    PromptsConfig, SearchConfig, VectorDriver, VectorStoreConfig,
};
pub use search::OutputFormat;
pub use vector::{Metadata, QueryResult, VectorItem, metadata_matches};
