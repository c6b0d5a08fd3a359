mod chunk;
mod complete;
mod config;
mod delete;
mod embed;
mod index;
mod prompts;
mod search;
mod status;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::models::{Config, Metadata};
use crate::observability::{SharedMetricsHook, SqliteMetricsStore, TracingMetricsHook};

pub use chunk::ChunkArgs;
pub use complete::CompleteArgs;
pub use config::ConfigCommand;
pub use delete::DeleteArgs;
pub use embed::EmbedArgs;
pub use index::IndexArgs;
pub use prompts::PromptsCommand;
pub use search::SearchArgs;

pub use chunk::handle_chunk;
pub use complete::handle_complete;
pub use config::handle_config;
pub use delete::handle_delete;
pub use embed::handle_embed;
pub use index::handle_index;
pub use prompts::handle_prompts;
pub use search::handle_search;
pub use status::handle_status;

/// Persist metric events when enabled, otherwise emit them as debug logs.
pub(crate) fn metrics_hook(config: &Config) -> Result<SharedMetricsHook> {
    if !config.metrics.enabled {
        return Ok(Arc::new(TracingMetricsHook));
    }

    let path = config
        .metrics
        .resolved_db_path()
        .context("could not determine metrics database path")?;
    let store = SqliteMetricsStore::open(&path)
        .with_context(|| format!("failed to open metrics database {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Parse `key=value` pairs. Values that parse as JSON keep their type,
/// anything else is stored as a string.
pub(crate) fn parse_metadata(pairs: &[String]) -> Result<Metadata> {
    let mut metadata = Metadata::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .with_context(|| format!("expected key=value, got '{}'", pair))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("empty key in '{}'", pair);
        }
        let value = serde_json::from_str(raw.trim())
            .unwrap_or_else(|_| serde_json::Value::String(raw.trim().to_string()));
        metadata.insert(key.to_string(), value);
    }
    Ok(metadata)
}
