//! Index command implementation.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::output::{IndexStats, get_formatter};
use crate::models::{Chunk, Config, Metadata, OutputFormat, SOURCE_ID_KEY};
use crate::services::{TextChunker, create_backend, create_embeddings_client, process_batch};

use super::{metrics_hook, parse_metadata};

#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Files or glob patterns to index
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// Target namespace (defaults to vector_store.default_namespace)
    #[arg(long, short = 'n')]
    pub namespace: Option<String>,

    /// Metadata copied to every chunk (repeatable)
    #[arg(long = "meta", value_name = "KEY=VALUE")]
    pub metadata: Vec<String>,

    /// Delete previously indexed chunks of each file first
    #[arg(long)]
    pub replace: bool,

    /// Show what would be indexed without indexing
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn handle_index(args: IndexArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);
    let start_time = Instant::now();

    let files = expand_paths(&args.paths)?;
    if files.is_empty() {
        print!("{}", formatter.format_message("No files found to index."));
        return Ok(());
    }

    if args.dry_run {
        print!(
            "{}",
            formatter.format_message(&format!("Dry run: would index {} files", files.len()))
        );
        for file in &files {
            println!("  {}", file.display());
        }
        return Ok(());
    }

    let namespace = args
        .namespace
        .unwrap_or_else(|| config.vector_store.default_namespace.clone());
    let base_metadata = parse_metadata(&args.metadata)?;

    let hook = metrics_hook(&config)?;
    let embeddings = create_embeddings_client(&config.embedding, hook.clone())
        .context("failed to create embeddings client")?;
    let store = create_backend(&config.vector_store, hook.clone())
        .await
        .context("failed to connect to vector store")?;
    store
        .ensure_collection()
        .await
        .context("failed to prepare vector store")?;
    let chunker = TextChunker::from_config(&config.chunking)?.with_metrics_hook(hook);

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let mut stats = IndexStats {
        namespace: namespace.clone(),
        ..Default::default()
    };

    let batch_size = config.embedding.batch_size as usize;
    let mut pending: Vec<Chunk> = Vec::new();

    for file_path in &files {
        pb.inc(1);

        let content = match std::fs::read_to_string(file_path) {
            Ok(c) if !c.trim().is_empty() => c,
            Ok(_) => {
                stats.files_skipped += 1;
                continue;
            }
            Err(e) => {
                if verbose {
                    pb.println(format!("Skipping {}: {}", file_path.display(), e));
                }
                stats.files_skipped += 1;
                continue;
            }
        };

        let source_id = file_path.display().to_string();
        let mut metadata = base_metadata.clone();
        metadata.insert(SOURCE_ID_KEY.to_string(), source_id.clone().into());

        if args.replace {
            let mut filter = Metadata::new();
            filter.insert(SOURCE_ID_KEY.to_string(), source_id.into());
            let removed = store
                .delete(&namespace, &[], Some(&filter))
                .await
                .with_context(|| format!("failed to clear {}", file_path.display()))?;
            if verbose && removed > 0 {
                pb.println(format!(
                    "Removed {} stale chunks of {}",
                    removed,
                    file_path.display()
                ));
            }
        }

        let chunks = chunker.chunk(&content, &metadata);
        stats.chunks_created += chunks.len() as u64;
        stats.files_indexed += 1;
        pending.extend(chunks);

        while pending.len() >= batch_size {
            let batch: Vec<Chunk> = pending.drain(..batch_size).collect();
            stats.items_written +=
                process_batch(embeddings.as_ref(), store.as_ref(), &namespace, &batch).await? as u64;
        }
    }

    if !pending.is_empty() {
        stats.items_written +=
            process_batch(embeddings.as_ref(), store.as_ref(), &namespace, &pending).await? as u64;
    }

    pb.finish_and_clear();
    stats.duration_ms = start_time.elapsed().as_millis() as u64;
    tracing::info!(
        namespace = %stats.namespace,
        files = stats.files_indexed,
        items = stats.items_written,
        "indexing finished"
    );
    print!("{}", formatter.format_index_stats(&stats));

    Ok(())
}

/// Expand glob patterns; plain paths pass through. Directories are skipped
/// and the result is sorted and deduplicated.
fn expand_paths(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let mut matched = false;
        for entry in glob::glob(pattern).with_context(|| format!("invalid pattern: {}", pattern))? {
            let path = entry?;
            matched = true;
            if path.is_file() {
                files.push(path);
            }
        }
        if !matched {
            anyhow::bail!("no files match: {}", pattern);
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}
