use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::prompts::PromptsLibrary;

#[derive(Debug, Subcommand)]
pub enum PromptsCommand {
    #[command(about = "List prompt names and versions")]
    List {
        #[arg(long, help = "Prompt directory (defaults to prompts.directory)")]
        dir: Option<PathBuf>,

        #[arg(help = "Only list versions of this prompt")]
        name: Option<String>,
    },
    #[command(about = "Show one prompt version")]
    Show {
        name: String,

        // `version` is taken by the propagated --version flag
        #[arg(id = "prompt_version", value_name = "VERSION")]
        version: String,

        #[arg(long, help = "Prompt directory (defaults to prompts.directory)")]
        dir: Option<PathBuf>,
    },
}

pub async fn handle_prompts(cmd: PromptsCommand, format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?;
    let formatter = get_formatter(format);

    match cmd {
        PromptsCommand::List { dir, name } => {
            let library = open_library(dir, &config)?;
            let prompts: Vec<(String, String)> = match name {
                Some(name) => library
                    .versions(&name)
                    .into_iter()
                    .map(|version| (name.clone(), version.to_string()))
                    .collect(),
                None => library
                    .list()
                    .into_iter()
                    .map(|(n, v)| (n.to_string(), v.to_string()))
                    .collect(),
            };
            print!("{}", formatter.format_prompt_list(&prompts));
        }
        PromptsCommand::Show { name, version, dir } => {
            let library = open_library(dir, &config)?;
            let prompt = library.get(&name, &version)?;
            print!("{}", formatter.format_prompt(prompt));
        }
    }

    Ok(())
}

fn open_library(dir: Option<PathBuf>, config: &Config) -> Result<PromptsLibrary> {
    let dir = dir
        .or_else(|| config.prompts.directory.clone())
        .context("no prompt directory: pass --dir or set prompts.directory")?;
    PromptsLibrary::load(&dir).with_context(|| format!("failed to load prompts from {}", dir.display()))
}
