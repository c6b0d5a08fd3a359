use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::{EmbeddingOutput, get_formatter};
use crate::models::{Config, OutputFormat};
use crate::services::create_embeddings_client;

use super::metrics_hook;

#[derive(Debug, Args)]
pub struct EmbedArgs {
    #[arg(required = true, help = "Texts to embed")]
    pub texts: Vec<String>,
}

pub async fn handle_embed(args: EmbedArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let client = create_embeddings_client(&config.embedding, metrics_hook(&config)?)
        .context("failed to create embeddings client")?;

    let start = Instant::now();
    let vectors = client
        .embed(&args.texts)
        .await
        .context("failed to generate embeddings")?;

    if verbose {
        eprintln!(
            "Embedded {} texts in {}ms",
            args.texts.len(),
            start.elapsed().as_millis()
        );
    }

    let output = EmbeddingOutput {
        backend: client.backend_name().to_string(),
        model: client.model().to_string(),
        dimension: vectors.first().map_or(0, Vec::len),
        texts: args.texts,
        vectors,
    };
    print!("{}", formatter.format_embeddings(&output));

    Ok(())
}
