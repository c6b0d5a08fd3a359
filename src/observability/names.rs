//! Standard metric names. Durations are milliseconds.

// LLM completions
pub const LLM_COMPLETION_DURATION: &str = "llm_completion_duration";
pub const LLM_REQUESTS_TOTAL: &str = "llm_requests_total";
pub const LLM_ERRORS_TOTAL: &str = "llm_errors_total";
pub const LLM_TOKENS_PROMPT: &str = "llm_tokens_prompt";
pub const LLM_TOKENS_COMPLETION: &str = "llm_tokens_completion";
pub const LLM_TOKENS_TOTAL: &str = "llm_tokens_total";

// Embeddings
pub const EMBEDDINGS_DURATION: &str = "embeddings_duration";
pub const EMBEDDINGS_REQUESTS_TOTAL: &str = "embeddings_requests_total";
pub const EMBEDDINGS_ERRORS_TOTAL: &str = "embeddings_errors_total";
pub const EMBEDDINGS_BATCH_SIZE: &str = "embeddings_batch_size";

// pgvector
pub const PGVECTOR_UPSERT_DURATION: &str = "pgvector_upsert_duration";
pub const PGVECTOR_QUERY_DURATION: &str = "pgvector_query_duration";
pub const PGVECTOR_DELETE_DURATION: &str = "pgvector_delete_duration";
pub const PGVECTOR_OPERATIONS_TOTAL: &str = "pgvector_operations_total";
pub const PGVECTOR_ERRORS_TOTAL: &str = "pgvector_errors_total";

// Qdrant
pub const QDRANT_UPSERT_DURATION: &str = "qdrant_upsert_duration";
pub const QDRANT_QUERY_DURATION: &str = "qdrant_query_duration";
pub const QDRANT_DELETE_DURATION: &str = "qdrant_delete_duration";
pub const QDRANT_OPERATIONS_TOTAL: &str = "qdrant_operations_total";
pub const QDRANT_ERRORS_TOTAL: &str = "qdrant_errors_total";

// SQLite
pub const SQLITE_UPSERT_DURATION: &str = "sqlite_upsert_duration";
pub const SQLITE_QUERY_DURATION: &str = "sqlite_query_duration";
pub const SQLITE_DELETE_DURATION: &str = "sqlite_delete_duration";
pub const SQLITE_OPERATIONS_TOTAL: &str = "sqlite_operations_total";
pub const SQLITE_ERRORS_TOTAL: &str = "sqlite_errors_total";

// Tools
pub const TOOL_CALL_DURATION: &str = "tool_call_duration";
pub const TOOL_CALLS_TOTAL: &str = "tool_calls_total";
pub const TOOL_ERRORS_TOTAL: &str = "tool_errors_total";

// Chunking
pub const CHUNKING_DURATION: &str = "chunking_duration";
pub const CHUNKING_CHUNKS_CREATED: &str = "chunking_chunks_created";

/// Metric names for one vector store backend.
#[derive(Debug, Clone, Copy)]
pub struct StoreMetricNames {
    pub upsert_duration: &'static str,
    pub query_duration: &'static str,
    pub delete_duration: &'static str,
    pub operations_total: &'static str,
    pub errors_total: &'static str,
}

pub const PGVECTOR: StoreMetricNames = StoreMetricNames {
    upsert_duration: PGVECTOR_UPSERT_DURATION,
    query_duration: PGVECTOR_QUERY_DURATION,
    delete_duration: PGVECTOR_DELETE_DURATION,
    operations_total: PGVECTOR_OPERATIONS_TOTAL,
    errors_total: PGVECTOR_ERRORS_TOTAL,
};

pub const QDRANT: StoreMetricNames = StoreMetricNames {
    upsert_duration: QDRANT_UPSERT_DURATION,
    query_duration: QDRANT_QUERY_DURATION,
    delete_duration: QDRANT_DELETE_DURATION,
    operations_total: QDRANT_OPERATIONS_TOTAL,
    errors_total: QDRANT_ERRORS_TOTAL,
};

pub const SQLITE: StoreMetricNames = StoreMetricNames {
    upsert_duration: SQLITE_UPSERT_DURATION,
    query_duration: SQLITE_QUERY_DURATION,
    delete_duration: SQLITE_DELETE_DURATION,
    operations_total: SQLITE_OPERATIONS_TOTAL,
    errors_total: SQLITE_ERRORS_TOTAL,
};
