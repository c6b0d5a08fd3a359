//! Command-line interface for llmkit.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

use crate::models::OutputFormat;

/// Chunk, embed, index and query text; inspect prompts and configuration.
#[derive(Debug, Parser)]
#[command(name = "llmkit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[arg(long, short = 'f', global = true, help = "Output format: text or json")]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Split a file or text into overlapping chunks
    Chunk(commands::ChunkArgs),

    /// Embed texts with the configured provider
    Embed(commands::EmbedArgs),

    /// Chunk, embed and store files in the vector store
    Index(commands::IndexArgs),

    /// Query the vector store with a text
    Search(commands::SearchArgs),

    /// Delete items by id and/or metadata filter
    Delete(commands::DeleteArgs),

    /// Send one message to the configured chat model
    Complete(commands::CompleteArgs),

    /// Inspect versioned prompts
    #[command(subcommand)]
    Prompts(commands::PromptsCommand),

    /// Manage configuration
    #[command(subcommand)]
    Config(commands::ConfigCommand),

    /// Check embeddings and vector store health
    Status,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search_with_filters() {
        let cli = Cli::try_parse_from([
            "llmkit", "--format", "json", "search", "hello", "-l", "3", "--filter", "lang=en",
        ])
        .unwrap();

        assert_eq!(cli.format, Some(OutputFormat::Json));
        match cli.command {
            Commands::Search(args) => {
                assert_eq!(args.query, "hello");
                assert_eq!(args.limit, Some(3));
                assert_eq!(args.filters, ["lang=en"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_prompts_show() {
        let cli = Cli::try_parse_from(["llmkit", "prompts", "show", "qa", "1.0", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Prompts(commands::PromptsCommand::Show { ref name, ref version, .. })
                if name == "qa" && version == "1.0"
        ));
    }

    #[test]
    fn test_version_flag_still_propagates_to_prompts_show() {
        let err = Cli::try_parse_from(["llmkit", "prompts", "show", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);

        let err = Cli::try_parse_from(["llmkit", "prompts", "show", "qa"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_parse_complete_overrides() {
        let cli = Cli::try_parse_from([
            "llmkit", "complete", "hi", "-s", "be brief", "--provider", "anthropic",
            "--max-tokens", "64",
        ])
        .unwrap();

        match cli.command {
            Commands::Complete(args) => {
                assert_eq!(args.message, "hi");
                assert_eq!(args.system.as_deref(), Some("be brief"));
                assert_eq!(args.provider, Some(crate::models::LlmProvider::Anthropic));
                assert_eq!(args.max_tokens, Some(64));
                assert_eq!(args.temperature, 0.0);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from(["llmkit", "complete", "hi", "--provider", "cohere"]).is_err());
    }

    #[test]
    fn test_chunk_requires_input() {
        assert!(Cli::try_parse_from(["llmkit", "chunk"]).is_err());
        assert!(Cli::try_parse_from(["llmkit", "chunk", "--text", "abc"]).is_ok());
    }
}
