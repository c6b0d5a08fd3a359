use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use llmkit::cli::commands::{
    handle_chunk, handle_complete, handle_config, handle_delete, handle_embed, handle_index,
    handle_prompts, handle_search, handle_status,
};
use llmkit::cli::{Cli, Commands};
use llmkit::models::{Config, OutputFormat};

/// Point ORT_DYLIB_PATH at a known ONNX Runtime install if it is not already set.
/// Must run before any ort code.
fn detect_and_set_ort_path() {
    if std::env::var("ORT_DYLIB_PATH")
        .map(|p| Path::new(&p).exists())
        .unwrap_or(false)
    {
        return;
    }

    let home = std::env::var("HOME").unwrap_or_default();

    let found = if cfg!(target_os = "macos") {
        [
            format!("{home}/.local/lib/llmkit/libonnxruntime.dylib"),
            "/opt/homebrew/opt/onnxruntime/lib/libonnxruntime.dylib".into(),
            "/usr/local/opt/onnxruntime/lib/libonnxruntime.dylib".into(),
        ]
        .into_iter()
        .find(|p| Path::new(p).exists())
    } else if cfg!(target_os = "linux") {
        [
            format!("{home}/.local/lib/llmkit/libonnxruntime.so"),
            "/usr/lib/libonnxruntime.so".into(),
            "/usr/local/lib/libonnxruntime.so".into(),
            "/usr/lib/x86_64-linux-gnu/libonnxruntime.so".into(),
            "/usr/lib/aarch64-linux-gnu/libonnxruntime.so".into(),
        ]
        .into_iter()
        .find(|p| Path::new(p).exists())
    } else {
        None
    };

    if let Some(path) = found {
        // SAFETY: called at program start before the runtime spawns worker threads.
        unsafe {
            std::env::set_var("ORT_DYLIB_PATH", path);
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "llmkit=debug" } else { "llmkit=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    detect_and_set_ort_path();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let format = cli.format.unwrap_or_else(|| {
        Config::load()
            .map(|c| c.search.default_format)
            .unwrap_or_default()
    });

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            tokio::select! {
                result = run_command(cli.command, format, cli.verbose) => result,
                _ = shutdown_signal() => {
                    eprintln!("\nReceived shutdown signal, cleaning up...");
                    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                    Ok(())
                }
            }
        })
}

async fn run_command(command: Commands, format: OutputFormat, verbose: bool) -> Result<()> {
    match command {
        Commands::Chunk(args) => handle_chunk(args, format, verbose).await,
        Commands::Embed(args) => handle_embed(args, format, verbose).await,
        Commands::Index(args) => handle_index(args, format, verbose).await,
        Commands::Search(args) => handle_search(args, format, verbose).await,
        Commands::Delete(args) => handle_delete(args, format, verbose).await,
        Commands::Complete(args) => handle_complete(args, format, verbose).await,
        Commands::Prompts(cmd) => handle_prompts(cmd, format, verbose).await,
        Commands::Config(cmd) => handle_config(cmd, format, verbose).await,
        Commands::Status => handle_status(format, verbose).await,
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
