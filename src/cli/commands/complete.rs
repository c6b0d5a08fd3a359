use anyhow::{Context, Result};
use clap::Args;

use crate::cli::output::{CompletionOutput, get_formatter};
use crate::llms::{CompletionOptions, Message, create_llm_client};
use crate::models::{Config, LlmProvider, OutputFormat};

use super::metrics_hook;

#[derive(Debug, Args)]
pub struct CompleteArgs {
    #[arg(help = "User message")]
    pub message: String,

    #[arg(long, short = 's', help = "System message")]
    pub system: Option<String>,

    #[arg(long, help = "Provider override: openai or anthropic")]
    pub provider: Option<LlmProvider>,

    #[arg(long, short = 'm', help = "Model override")]
    pub model: Option<String>,

    #[arg(long, default_value_t = 0.0, help = "Sampling temperature")]
    pub temperature: f32,

    #[arg(long, help = "Maximum tokens in the reply")]
    pub max_tokens: Option<u32>,
}

pub async fn handle_complete(args: CompleteArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let mut config = Config::load()?;
    let formatter = get_formatter(format);

    if let Some(provider) = args.provider.filter(|p| *p != config.llm.provider) {
        // a key loaded for the configured provider is not valid for another one
        config.llm.provider = provider;
        config.llm.api_key = std::env::var(provider.api_key_env()).ok();
        config.llm.url = None;
    }
    if args.model.is_some() {
        config.llm.model = args.model;
    }

    let client = create_llm_client(&config.llm, metrics_hook(&config)?)
        .context("failed to create LLM client")?;

    let mut messages = Vec::new();
    if let Some(system) = args.system {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(args.message));

    let options = CompletionOptions {
        temperature: args.temperature,
        max_tokens: args.max_tokens,
    };
    let response = client
        .complete(&messages, &[], &options)
        .await
        .context("completion failed")?;

    if verbose {
        eprintln!(
            "{} {} answered in {:.0}ms",
            client.provider_name(),
            client.model(),
            response.latency_ms
        );
    }

    let output = CompletionOutput {
        provider: client.provider_name().to_string(),
        model: client.model().to_string(),
        response,
    };
    print!("{}", formatter.format_completion(&output));

    Ok(())
}
