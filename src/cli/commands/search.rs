use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::{QueryOutput, get_formatter};
use crate::models::{Config, OutputFormat};
use crate::services::{create_backend, create_embeddings_client};

use super::{metrics_hook, parse_metadata};

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(required = true, help = "Search query text")]
    pub query: String,

    #[arg(long, short = 'l', help = "Maximum number of results to return")]
    pub limit: Option<u32>,

    #[arg(long, short = 'n', help = "Namespace to search")]
    pub namespace: Option<String>,

    #[arg(
        long = "filter",
        value_name = "KEY=VALUE",
        help = "Exact-match metadata filter (repeatable)"
    )]
    pub filters: Vec<String>,
}

pub async fn handle_search(args: SearchArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let query = args.query.trim();
    if query.is_empty() {
        anyhow::bail!("search query cannot be empty");
    }

    let config = Config::load()?;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let limit = args.limit.unwrap_or(config.search.default_limit);
    if limit == 0 {
        anyhow::bail!("limit must be at least 1");
    }
    let namespace = args
        .namespace
        .unwrap_or_else(|| config.vector_store.default_namespace.clone());
    let filters = parse_metadata(&args.filters)?;

    if verbose {
        eprintln!("Query: \"{query}\"");
        eprintln!("  Namespace: {namespace}");
        eprintln!("  Limit: {limit}");
        if !filters.is_empty() {
            eprintln!("  Filters: {}", serde_json::Value::Object(filters.clone()));
        }
    }

    let hook = metrics_hook(&config)?;
    let embeddings = create_embeddings_client(&config.embedding, hook.clone())
        .context("failed to create embeddings client")?;
    let store = create_backend(&config.vector_store, hook)
        .await
        .context("failed to connect to vector store")?;

    let embed_start = Instant::now();
    let query_vector = embeddings
        .embed_one(query)
        .await
        .context("failed to generate query embedding")?;
    let embed_ms = embed_start.elapsed().as_millis();

    let search_start = Instant::now();
    let results = store
        .query(
            &namespace,
            &query_vector,
            limit as usize,
            (!filters.is_empty()).then_some(&filters),
        )
        .await
        .context("search failed")?;
    let search_ms = search_start.elapsed().as_millis();

    if verbose {
        let total_ms = start_time.elapsed().as_millis();
        eprintln!("Timing:");
        eprintln!("  Embedding: {embed_ms}ms");
        eprintln!("  Search: {search_ms}ms");
        eprintln!("  Total: {total_ms}ms");
        eprintln!();
    }

    let output = QueryOutput {
        query: query.to_string(),
        namespace,
        results,
        duration_ms: start_time.elapsed().as_millis() as u64,
    };
    print!("{}", formatter.format_query_results(&output));

    Ok(())
}
