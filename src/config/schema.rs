//! Configuration schema for Quill
//!
//! Configuration is stored at `~/.config/quill/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Site repository settings
    pub repo: RepoConfig,

    /// Content cache settings
    pub cache: CacheConfig,

    /// Deploy pipeline settings
    pub deploy: DeployConfig,

    /// Access gate settings
    pub auth: AuthConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Enable audit logging
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            audit_log: true,
        }
    }
}

/// Site repository settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Git URL of the site repository (ssh or https)
    pub url: Option<String>,

    /// Branch to sync and publish
    pub branch: String,

    /// Directory holding local clones (defaults to the state dir)
    pub repos_dir: Option<PathBuf>,

    /// Posts directory inside the checkout, indexed by the content cache
    pub posts_dir: PathBuf,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            url: None,
            branch: "master".to_string(),
            repos_dir: None,
            posts_dir: PathBuf::from("source").join("_posts"),
        }
    }
}

/// Content cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds between background refreshes of one entry
    pub refresh_interval_secs: u64,

    /// Seconds to wait for a background loop to stop before giving up on it
    pub stop_timeout_secs: u64,
}

impl CacheConfig {
    /// Never shorter than one second, so a zero interval cannot spin
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 300,
            stop_timeout_secs: 2,
        }
    }
}

/// One build-tool invocation in the deploy pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStepConfig {
    /// Step name shown in job reports
    pub name: String,

    /// Program and arguments
    pub command: Vec<String>,
}

impl BuildStepConfig {
    fn new(name: &str, command: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Deploy pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Ordered build-tool invocations run after sync
    pub steps: Vec<BuildStepConfig>,

    /// Wall-clock limit for one build-tool invocation
    pub tool_timeout_secs: u64,

    /// Maximum characters of output kept per step
    pub step_output_limit: usize,

    /// Commit message used when publishing build output
    pub publish_message: String,

    /// Tasks older than this are dropped on the next submission
    pub max_task_age_secs: u64,

    /// Maximum number of tasks retained
    pub max_task_count: usize,
}

impl DeployConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            steps: vec![
                BuildStepConfig::new("npm install", &["npm", "install"]),
                BuildStepConfig::new("npx hexo clean", &["npx", "hexo", "clean"]),
                BuildStepConfig::new("npx hexo generate", &["npx", "hexo", "generate"]),
            ],
            tool_timeout_secs: 300,
            step_output_limit: 500,
            publish_message: "Deploy site update".to_string(),
            max_task_age_secs: 3600,
            max_task_count: 50,
        }
    }
}

/// Access gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared access token (prefer QUILL_ACCESS_TOKEN)
    pub token: Option<String>,

    /// Failures before an identity is temporarily banned
    pub temp_ban_threshold: u32,

    /// Failures before an identity is permanently banned
    pub perm_ban_threshold: u32,

    /// Length of a temporary ban in seconds
    pub temp_ban_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token: None,
            temp_ban_threshold: 20,
            perm_ban_threshold: 50,
            temp_ban_secs: 300,
        }
    }
}
