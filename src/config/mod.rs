//! Configuration management for Quill

pub mod schema;

pub use schema::Config;

use crate::error::{QuillError, QuillResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Environment variable overriding `repo.url`
pub const ENV_REPO_URL: &str = "QUILL_REPO_URL";
/// Environment variable overriding `repo.branch`
pub const ENV_REPO_BRANCH: &str = "QUILL_REPO_BRANCH";
/// Environment variable overriding `auth.token`
pub const ENV_ACCESS_TOKEN: &str = "QUILL_ACCESS_TOKEN";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quill")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quill")
    }

    /// Get the default directory for local repository clones
    pub fn repos_dir() -> PathBuf {
        Self::state_dir().join("repos")
    }

    /// Get the audit log path
    pub fn audit_log_path() -> PathBuf {
        Self::state_dir().join("audit.log")
    }

    /// Load configuration, falling back to defaults, then apply env overrides
    pub async fn load(&self) -> QuillResult<Config> {
        let mut config = if self.config_path.exists() {
            self.load_from_file(&self.config_path).await?
        } else {
            debug!("Config file not found, using defaults");
            Config::default()
        };

        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> QuillResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| QuillError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| QuillError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> QuillResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            QuillError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> QuillResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| QuillError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Ensure all state directories exist
    pub async fn ensure_state_dirs() -> QuillResult<()> {
        let dirs = [Self::state_dir(), Self::repos_dir()];

        for dir in &dirs {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| QuillError::io(format!("creating directory {}", dir.display()), e))?;
        }

        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Overlay environment values onto a loaded config. Empty values are ignored.
fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = get(ENV_REPO_URL) {
        config.repo.url = Some(url);
    }
    if let Some(branch) = get(ENV_REPO_BRANCH) {
        config.repo.branch = branch;
    }
    if let Some(token) = get(ENV_ACCESS_TOKEN) {
        config.auth.token = Some(token);
    }
}
