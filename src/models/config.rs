use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::search::OutputFormat;
use crate::error::ConfigError;

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1536;
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_POSTGRES_URL: &str = "postgres://localhost:5432/llmkit";
pub const DEFAULT_COLLECTION: &str = "llmkit";
pub const DEFAULT_NAMESPACE: &str = "__global__";
pub const DEFAULT_METRICS_RETENTION_DAYS: u32 = 30;
pub const DEFAULT_OPENAI_CHAT_MODEL: &str = "gpt-4o";
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com/v1";

const CONFIG_ENV: &str = "LLMKIT_CONFIG";
const PG_POOL_MIN_ENV: &str = "LLMKIT_PG_POOL_MIN_SIZE";
const PG_POOL_MAX_ENV: &str = "LLMKIT_PG_POOL_MAX_SIZE";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub prompts: PromptsConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

impl Config {
    /// Path of the active config file: `$LLMKIT_CONFIG`, else the user config dir.
    pub fn config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV)
            && !path.is_empty()
        {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|p| p.join("llmkit").join("config.toml"))
    }

    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("llmkit"))
    }

    /// Load the config file if it exists, falling back to defaults, then apply
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path().ok_or_else(|| {
            ConfigError::PathError("could not determine config directory".to_string())
        })?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = std::env::var("OPENAI_API_KEY").ok();
        }
        if self.vector_store.api_key.is_none() {
            self.vector_store.api_key = std::env::var("QDRANT_API_KEY").ok();
        }
        if self.llm.api_key.is_none() {
            self.llm.api_key = std::env::var(self.llm.provider.api_key_env()).ok();
        }
        if let Some(min) = env_u32(PG_POOL_MIN_ENV) {
            self.vector_store.pool_min = min;
        }
        if let Some(max) = env_u32(PG_POOL_MAX_ENV) {
            self.vector_store.pool_max = max;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.batch_size must be > 0".to_string(),
            ));
        }
        if self.embedding.max_concurrent == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.max_concurrent must be > 0".to_string(),
            ));
        }
        if self.vector_store.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "vector_store.dimension must be > 0".to_string(),
            ));
        }
        if self.vector_store.pool_min > self.vector_store.pool_max {
            return Err(ConfigError::ValidationError(format!(
                "vector_store.pool_min ({}) exceeds pool_max ({})",
                self.vector_store.pool_min, self.vector_store.pool_max
            )));
        }
        if self.chunking.chunk_size == 0 || self.chunking.overlap >= self.chunking.chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "chunking.overlap ({}) must be < chunking.chunk_size ({})",
                self.chunking.overlap, self.chunking.chunk_size
            )));
        }
        Ok(())
    }
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Embedding provider selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    OpenAi,
    Local,
}

impl std::fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingProvider::OpenAi => write!(f, "openai"),
            EmbeddingProvider::Local => write!(f, "local"),
        }
    }
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(EmbeddingProvider::OpenAi),
            "local" => Ok(EmbeddingProvider::Local),
            _ => Err(format!("unknown embeddings provider: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_embedding_url")]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Directory holding `model.onnx` and `tokenizer.json` for the local provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub normalize: bool,
}

fn default_embedding_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

fn default_embedding_url() -> String {
    DEFAULT_OPENAI_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_batch_size() -> u32 {
    100
}

fn default_max_concurrent() -> u32 {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_tokens() -> u32 {
    256
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: default_embedding_model(),
            url: default_embedding_url(),
            api_key: None,
            timeout_secs: default_timeout(),
            batch_size: default_batch_size(),
            max_concurrent: default_max_concurrent(),
            max_retries: default_max_retries(),
            model_path: None,
            max_tokens: default_max_tokens(),
            normalize: false,
        }
    }
}

/// Chat-completion provider selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    OpenAi,
    Anthropic,
}

impl LlmProvider {
    /// Environment variable holding the provider's API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "OPENAI_API_KEY",
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::OpenAi => write!(f, "openai"),
            LlmProvider::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "anthropic" => Ok(LlmProvider::Anthropic),
            _ => Err(format!("unknown LLM provider: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,

    /// Defaults per provider when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// API base URL; defaults per provider when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            model: None,
            url: None,
            api_key: None,
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl LlmConfig {
    pub fn resolved_model(&self) -> String {
        self.model.clone().unwrap_or_else(|| {
            match self.provider {
                LlmProvider::OpenAi => DEFAULT_OPENAI_CHAT_MODEL,
                LlmProvider::Anthropic => DEFAULT_ANTHROPIC_MODEL,
            }
            .to_string()
        })
    }

    pub fn resolved_url(&self) -> String {
        self.url.clone().unwrap_or_else(|| {
            match self.provider {
                LlmProvider::OpenAi => DEFAULT_OPENAI_URL,
                LlmProvider::Anthropic => DEFAULT_ANTHROPIC_URL,
            }
            .to_string()
        })
    }
}

/// Vector store backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorDriver {
    #[default]
    Qdrant,
    #[serde(alias = "postgresql", alias = "pgvector")]
    Postgres,
    Sqlite,
}

impl std::fmt::Display for VectorDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorDriver::Qdrant => write!(f, "qdrant"),
            VectorDriver::Postgres => write!(f, "postgres"),
            VectorDriver::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for VectorDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "qdrant" => Ok(VectorDriver::Qdrant),
            "postgres" | "postgresql" | "pgvector" => Ok(VectorDriver::Postgres),
            "sqlite" => Ok(VectorDriver::Sqlite),
            _ => Err(format!("unknown vector store driver: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default)]
    pub driver: VectorDriver,

    /// Qdrant URL or PostgreSQL DSN.
    #[serde(default = "default_vector_url")]
    pub url: String,

    /// Qdrant collection name.
    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// SQLite database file; `<data_dir>/llmkit/vectors.db` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default = "default_dimension")]
    pub dimension: u32,

    #[serde(default = "default_namespace")]
    pub default_namespace: String,

    #[serde(default = "default_pool_min")]
    pub pool_min: u32,

    #[serde(default = "default_pool_max")]
    pub pool_max: u32,

    #[serde(default = "default_pool_acquire_timeout")]
    pub pool_acquire_timeout: u32,
}

fn default_vector_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_dimension() -> u32 {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_pool_min() -> u32 {
    1
}

fn default_pool_max() -> u32 {
    10
}

fn default_pool_acquire_timeout() -> u32 {
    30
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            driver: VectorDriver::default(),
            url: default_vector_url(),
            collection: default_collection(),
            api_key: None,
            path: None,
            dimension: default_dimension(),
            default_namespace: default_namespace(),
            pool_min: default_pool_min(),
            pool_max: default_pool_max(),
            pool_acquire_timeout: default_pool_acquire_timeout(),
        }
    }
}

impl VectorStoreConfig {
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path
            .clone()
            .or_else(|| Config::data_dir().map(|d| d.join("vectors.db")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window size in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared by consecutive windows.
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

fn default_retention_days() -> u32 {
    DEFAULT_METRICS_RETENTION_DAYS
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            retention_days: default_retention_days(),
            db_path: None,
        }
    }
}

impl MetricsConfig {
    pub fn resolved_db_path(&self) -> Option<PathBuf> {
        self.db_path
            .clone()
            .or_else(|| Config::data_dir().map(|d| d.join("metrics.db")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: u32,

    #[serde(default)]
    pub default_format: OutputFormat,
}

fn default_limit() -> u32 {
    10
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            default_format: OutputFormat::Text,
        }
    }
}
