use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat, SOURCE_ID_KEY};
use crate::services::TextChunker;

use super::{metrics_hook, parse_metadata};

#[derive(Debug, Args)]
pub struct ChunkArgs {
    #[arg(help = "File to chunk", required_unless_present = "text")]
    pub file: Option<PathBuf>,

    #[arg(long, conflicts_with = "file", help = "Chunk this text instead of a file")]
    pub text: Option<String>,

    #[arg(long, help = "Window size in characters")]
    pub chunk_size: Option<usize>,

    #[arg(long, help = "Characters shared by consecutive chunks")]
    pub overlap: Option<usize>,

    #[arg(long, help = "Source id used in chunk ids (defaults to the file path)")]
    pub source_id: Option<String>,

    #[arg(long = "meta", value_name = "KEY=VALUE", help = "Metadata copied to every chunk")]
    pub metadata: Vec<String>,
}

pub async fn handle_chunk(args: ChunkArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    let (text, default_source) = match (&args.text, &args.file) {
        (Some(text), _) => (text.clone(), None),
        (None, Some(path)) => (
            std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
            Some(path.display().to_string()),
        ),
        (None, None) => anyhow::bail!("either a file or --text is required"),
    };

    let chunker = TextChunker::new(
        args.chunk_size.unwrap_or(config.chunking.chunk_size),
        args.overlap.unwrap_or(config.chunking.overlap),
    )?
    .with_metrics_hook(metrics_hook(&config)?);

    let mut metadata = parse_metadata(&args.metadata)?;
    if let Some(source_id) = args.source_id.or(default_source) {
        metadata.insert(SOURCE_ID_KEY.to_string(), source_id.into());
    }

    if verbose {
        eprintln!(
            "Chunking {} chars (size {}, overlap {})",
            text.chars().count(),
            chunker.chunk_size(),
            chunker.overlap()
        );
    }

    let chunks = chunker.chunk(&text, &metadata);
    print!("{}", formatter.format_chunks(&chunks));

    Ok(())
}
