//! CLI command implementations

pub mod build;
pub mod config;
pub mod deploy;
pub mod refresh;
pub mod token;

pub use build::execute as build;
pub use config::execute as config;
pub use deploy::execute as deploy;
pub use refresh::{execute as refresh, watch};
pub use token::execute as token;

use crate::config::{Config, ConfigManager};
use crate::pipeline::{BuildPipeline, ProcessToolRunner};
use crate::transport::GitTransport;
use std::sync::Arc;

/// Git transport rooted at `repo.repos_dir` or the state directory
fn git_transport(config: &Config) -> Arc<GitTransport> {
    let repos_dir = config
        .repo
        .repos_dir
        .clone()
        .unwrap_or_else(ConfigManager::repos_dir);
    Arc::new(GitTransport::new(repos_dir))
}

/// Pipeline wired to git and local build tools
fn site_pipeline(config: &Config) -> BuildPipeline {
    BuildPipeline::from_config(config, git_transport(config), Arc::new(ProcessToolRunner::new()))
}
