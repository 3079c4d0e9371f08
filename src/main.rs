//! Quill - static site deploys from a content repository
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use quill::cli::{Cli, Commands};
use quill::config::ConfigManager;
use quill::error::QuillResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> QuillResult<()> {
    let cli = Cli::parse();

    // Token generation needs neither config nor logging
    if let Commands::Token(args) = cli.command {
        return quill::cli::commands::token(args).await;
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    // 0 = warn (spinners only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("quill=warn"),
        1 => EnvFilter::new("quill=info"),
        _ => EnvFilter::new("quill=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .init();
    }
    debug!("Loaded configuration from {}", config_manager.path().display());

    if let Commands::Config(args) = cli.command {
        return quill::cli::commands::config(args, &config_manager, &config).await;
    }

    ConfigManager::ensure_state_dirs().await?;

    match cli.command {
        Commands::Token(_) | Commands::Config(_) => unreachable!("handled above"),
        Commands::Deploy(args) => quill::cli::commands::deploy(args, &config).await,
        Commands::Build => quill::cli::commands::build(&config).await,
        Commands::Refresh(args) => quill::cli::commands::refresh(args, &config).await,
        Commands::Watch(args) => quill::cli::commands::watch(args, &config).await,
    }
}
