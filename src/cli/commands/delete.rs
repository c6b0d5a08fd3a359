use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::create_backend;

use super::{metrics_hook, parse_metadata};

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Namespace to delete from
    #[arg(long, short = 'n')]
    pub namespace: Option<String>,

    /// Item ids to delete (repeatable)
    #[arg(long = "id")]
    pub ids: Vec<String>,

    /// Exact-match metadata filter (repeatable). Combined with --id, both must match.
    #[arg(long = "filter", value_name = "KEY=VALUE")]
    pub filters: Vec<String>,
}

pub async fn handle_delete(args: DeleteArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    if args.ids.is_empty() && args.filters.is_empty() {
        anyhow::bail!("delete requires at least one --id or --filter");
    }

    let config = Config::load()?;
    let formatter = get_formatter(format);

    let namespace = args
        .namespace
        .unwrap_or_else(|| config.vector_store.default_namespace.clone());
    let filters = parse_metadata(&args.filters)?;

    let store = create_backend(&config.vector_store, metrics_hook(&config)?)
        .await
        .context("failed to connect to vector store")?;

    if verbose {
        eprintln!(
            "Deleting from {} ({} ids, {} filters)",
            namespace,
            args.ids.len(),
            filters.len()
        );
    }

    let deleted = store
        .delete(
            &namespace,
            &args.ids,
            (!filters.is_empty()).then_some(&filters),
        )
        .await
        .context("delete failed")?;

    print!("{}", formatter.format_deleted(&namespace, deleted));
    Ok(())
}
