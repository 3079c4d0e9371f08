//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Quill - static site deploys from a content repository
///
/// Syncs a Hexo site from git, builds it, publishes the result, and keeps
/// an in-memory index of posts fresh in the background.
#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(author, version, long_about = None)]
#[command(about = "Quill - static site deploys from a content repository")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "QUILL_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Submit a deploy job and follow it to completion
    Deploy(DeployArgs),

    /// Sync, build and publish in the foreground
    Build,

    /// Refresh the post index now and show cache status
    Refresh(RepoArgs),

    /// Keep the post index refreshed until Ctrl-C
    Watch(RepoArgs),

    /// Generate a random access token
    Token(TokenArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the deploy command
#[derive(Parser, Debug)]
pub struct DeployArgs {
    /// Access token (defaults to the configured one)
    #[arg(short, long)]
    pub token: Option<String>,

    /// Identity recorded as the trigger
    #[arg(long, default_value = "cli")]
    pub identity: String,

    /// Print the finished job as JSON
    #[arg(long)]
    pub json: bool,

    /// Seconds between status polls
    #[arg(long, default_value = "1")]
    pub poll_secs: u64,
}

/// Repository selection for cache commands
#[derive(Parser, Debug)]
pub struct RepoArgs {
    /// Repository URL (defaults to repo.url)
    #[arg(long)]
    pub url: Option<String>,

    /// Branch (defaults to repo.branch)
    #[arg(short, long)]
    pub branch: Option<String>,
}

/// Arguments for the token command
#[derive(Parser, Debug)]
pub struct TokenArgs {
    /// Token length in characters
    #[arg(short, long, default_value = "32", value_parser = clap::value_parser!(u16).range(8..=256))]
    pub length: u16,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}
