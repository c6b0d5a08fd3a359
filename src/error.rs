//! Error types for llmkit.

use std::path::PathBuf;

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors related to text chunking.
#[derive(Debug, Error)]
pub enum ChunkingError {
    #[error("chunk_size must be > 0")]
    InvalidChunkSize,

    #[error("overlap must be < chunk_size (overlap: {overlap}, chunk_size: {chunk_size})")]
    OverlapTooLarge { overlap: usize, chunk_size: usize },
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to connect to embedding provider: {0}")]
    ConnectionError(String),

    #[error("embedding provider returned status {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding timeout")]
    Timeout,

    #[error("embedding configuration error: {0}")]
    ConfigError(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("model error: {0}")]
    ModelError(String),
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::ConnectionError(_) | EmbeddingError::Timeout => true,
            // Rate limiting and gateway failures are transient
            EmbeddingError::ServerError { status, .. } => *status == 429 || *status >= 500,
            EmbeddingError::RequestError(e) => e.is_timeout() || e.is_connect(),
            EmbeddingError::InvalidResponse(_)
            | EmbeddingError::ConfigError(_)
            | EmbeddingError::ModelNotFound(_)
            | EmbeddingError::ModelError(_) => false,
        }
    }
}

/// Errors related to chat-completion calls.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("failed to connect to LLM provider: {0}")]
    ConnectionError(String),

    #[error("LLM provider returned status {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("LLM request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid LLM response: {0}")]
    InvalidResponse(String),

    #[error("LLM request timeout")]
    Timeout,

    #[error("LLM configuration error: {0}")]
    ConfigError(String),
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            LlmError::ConnectionError(_) | LlmError::Timeout => true,
            LlmError::ServerError { status, .. } => *status == 429 || *status >= 500,
            LlmError::RequestError(e) => e.is_timeout() || e.is_connect(),
            LlmError::InvalidResponse(_) | LlmError::ConfigError(_) => false,
        }
    }
}

/// Errors related to vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("failed to connect to vector store: {0}")]
    ConnectionError(String),

    #[error("collection error: {0}")]
    CollectionError(String),

    #[error("upsert error: {0}")]
    UpsertError(String),

    #[error("query error: {0}")]
    QueryError(String),

    #[error("delete error: {0}")]
    DeleteError(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("PostgreSQL error: {0}")]
    PostgresError(String),

    #[error("pgvector extension error: {0}")]
    PgVectorExtensionError(String),

    #[error("SQLite error: {0}")]
    SqliteError(String),
}

impl Retryable for VectorStoreError {
    fn is_retryable(&self) -> bool {
        match self {
            VectorStoreError::ConnectionError(_) => true,
            VectorStoreError::InvalidArgument(_) | VectorStoreError::PgVectorExtensionError(_) => {
                false
            }
            VectorStoreError::CollectionError(msg)
            | VectorStoreError::UpsertError(msg)
            | VectorStoreError::QueryError(msg)
            | VectorStoreError::DeleteError(msg)
            | VectorStoreError::PostgresError(msg)
            | VectorStoreError::SqliteError(msg) => {
                let msg_lower = msg.to_lowercase();
                msg_lower.contains("timeout")
                    || msg_lower.contains("timed out")
                    || msg_lower.contains("connection")
                    || msg_lower.contains("unavailable")
                    || msg_lower.contains("too many")
                    || msg_lower.contains("database is locked")
            }
        }
    }
}

/// Errors related to tool registration and dispatch.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool '{0}' not found")]
    NotFound(String),

    #[error("tool '{0}' already registered")]
    AlreadyRegistered(String),

    #[error("invalid arguments for tool '{tool}': {message}")]
    Validation { tool: String, message: String },

    #[error("tool '{tool}' failed: {message}")]
    Execution { tool: String, message: String },

    #[error("invalid tool call: {0}")]
    InvalidCall(String),
}

/// Errors related to prompt loading and lookup.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt '{name}' version '{version}' not found")]
    NotFound { name: String, version: String },

    #[error("prompt directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse prompt file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("prompt '{name}' version '{version}' defined twice ({path})")]
    Duplicate {
        name: String,
        version: String,
        path: PathBuf,
    },

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors related to the metrics store.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metrics database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors related to the chunk → embed → upsert pipeline.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("embedding count mismatch: {expected} chunks, {actual} vectors")]
    CountMismatch { expected: usize, actual: usize },
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_error_retryable() {
        assert!(EmbeddingError::Timeout.is_retryable());
        assert!(EmbeddingError::ConnectionError("refused".into()).is_retryable());
        assert!(
            EmbeddingError::ServerError {
                status: 503,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            EmbeddingError::ServerError {
                status: 429,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !EmbeddingError::ServerError {
                status: 400,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(!EmbeddingError::InvalidResponse("bad".into()).is_retryable());
    }

    #[test]
    fn test_llm_error_retryable() {
        assert!(LlmError::Timeout.is_retryable());
        assert!(
            LlmError::ServerError {
                status: 529,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !LlmError::ServerError {
                status: 401,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(!LlmError::InvalidResponse("no choices".into()).is_retryable());
    }

    #[test]
    fn test_vector_store_error_retryable() {
        assert!(VectorStoreError::ConnectionError("x".into()).is_retryable());
        assert!(VectorStoreError::QueryError("request timed out".into()).is_retryable());
        assert!(!VectorStoreError::QueryError("syntax error".into()).is_retryable());
        assert!(!VectorStoreError::InvalidArgument("top_k".into()).is_retryable());
    }

    #[test]
    fn test_prompt_not_found_message() {
        let err = PromptError::NotFound {
            name: "greeting".into(),
            version: "9.9".into(),
        };
        assert_eq!(err.to_string(), "prompt 'greeting' version '9.9' not found");
    }
}
