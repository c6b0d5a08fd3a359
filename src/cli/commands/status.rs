use anyhow::Result;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, OutputFormat, VectorDriver};
use crate::observability::SqliteMetricsStore;
use crate::services::{create_backend, create_embeddings_client};

use super::metrics_hook;

pub async fn handle_status(format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let hook = metrics_hook(&config)?;

    let (embedding_backend, embedding_model, embedding_healthy, embedding_error) =
        match create_embeddings_client(&config.embedding, hook.clone()) {
            Ok(client) => {
                let health = client.health_check().await;
                (
                    client.backend_name().to_string(),
                    client.model().to_string(),
                    health.is_ok(),
                    health.err().map(|e| e.to_string()),
                )
            }
            Err(e) => (
                config.embedding.provider.to_string(),
                config.embedding.model.clone(),
                false,
                Some(e.to_string()),
            ),
        };

    let namespace = config.vector_store.default_namespace.clone();
    let (vector_store_connected, namespace_count) =
        match create_backend(&config.vector_store, hook).await {
            Ok(store) => {
                let connected = store.health_check().await.unwrap_or(false);
                let count = if connected {
                    store.count(&namespace).await.ok()
                } else {
                    None
                };
                (connected, count)
            }
            Err(e) => {
                if verbose {
                    eprintln!("Vector store error: {e}");
                }
                (false, None)
            }
        };

    let metrics = if config.metrics.enabled {
        config
            .metrics
            .resolved_db_path()
            .and_then(|path| SqliteMetricsStore::open(&path).ok())
            .and_then(|store| {
                if let Err(e) = store.cleanup(config.metrics.retention_days) {
                    tracing::warn!(error = %e, "metrics cleanup failed");
                }
                store.summary(config.metrics.retention_days).ok()
            })
    } else {
        None
    };

    let vector_store_url = match config.vector_store.driver {
        VectorDriver::Sqlite => config
            .vector_store
            .path
            .as_ref()
            .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string()),
        _ => config.vector_store.url.clone(),
    };

    let status = StatusInfo {
        embedding_backend,
        embedding_model,
        embedding_healthy,
        embedding_error,
        vector_store_driver: config.vector_store.driver.to_string(),
        vector_store_url,
        vector_store_connected,
        namespace,
        namespace_count,
        metrics,
    };

    print!("{}", formatter.format_status(&status));

    if !vector_store_connected {
        eprintln!();
        match config.vector_store.driver {
            VectorDriver::Qdrant => {
                eprintln!("Warning: Qdrant not reachable. Start with: docker compose up -d qdrant");
            }
            VectorDriver::Postgres => {
                eprintln!("Warning: PostgreSQL not accessible. Check connection settings.");
            }
            VectorDriver::Sqlite => {
                eprintln!("Warning: SQLite vector store could not be opened.");
            }
        }
    }

    Ok(())
}
