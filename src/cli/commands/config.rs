use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};

const REDACTED: &str = "********";

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write a config file with default values")]
    Init {
        #[arg(long, help = "Force overwrite existing config")]
        force: bool,
    },
    #[command(about = "Show the effective configuration")]
    Show,
    #[command(about = "Show the configuration file path")]
    Path,
}

pub async fn handle_config(cmd: ConfigCommand, format: OutputFormat, _verbose: bool) -> Result<()> {
    match cmd {
        ConfigCommand::Init { force } => handle_init(force, format),
        ConfigCommand::Show => handle_show(format),
        ConfigCommand::Path => handle_path(format),
    }
}

fn handle_init(force: bool, format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let config_path =
        Config::config_path().context("could not determine config directory")?;

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config already exists at: {}\nUse --force to overwrite.",
            config_path.display()
        );
    }

    Config::default()
        .save_to(&config_path)
        .context("failed to write config")?;
    print!(
        "{}",
        formatter.format_message(&format!("Created config at: {}", config_path.display()))
    );
    Ok(())
}

fn handle_show(format: OutputFormat) -> Result<()> {
    let config = redacted(Config::load()?);

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if let Some(path) = Config::config_path().filter(|p| p.exists()) {
        println!("# Config: {}", path.display());
    } else {
        println!("# Config: defaults (no config file)");
    }
    println!();
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn handle_path(format: OutputFormat) -> Result<()> {
    let formatter = get_formatter(format);
    let path = Config::config_path().context("could not determine config directory")?;
    let state = if path.exists() { "active" } else { "would be" };
    print!(
        "{}",
        formatter.format_message(&format!("Config ({}): {}", state, path.display()))
    );
    Ok(())
}

/// Mask credentials before printing.
fn redacted(mut config: Config) -> Config {
    if config.embedding.api_key.is_some() {
        config.embedding.api_key = Some(REDACTED.to_string());
    }
    if config.vector_store.api_key.is_some() {
        config.vector_store.api_key = Some(REDACTED.to_string());
    }
    if config.llm.api_key.is_some() {
        config.llm.api_key = Some(REDACTED.to_string());
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacted_masks_keys() {
        let mut config = Config::default();
        config.embedding.api_key = Some("sk-secret".to_string());
        config.llm.api_key = Some("sk-ant-secret".to_string());

        let shown = redacted(config);
        assert_eq!(shown.embedding.api_key.as_deref(), Some(REDACTED));
        assert!(shown.vector_store.api_key.is_none());
        assert_eq!(shown.llm.api_key.as_deref(), Some(REDACTED));

        let rendered = toml::to_string_pretty(&shown).unwrap();
        assert!(!rendered.contains("sk-secret"));
    }
}
