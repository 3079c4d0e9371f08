//! Error types for Quill
//!
//! All modules use `QuillResult<T>` as their return type.

use crate::jobs::StepRecord;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Quill operations
pub type QuillResult<T> = Result<T, QuillError>;

/// All errors that can occur in Quill
#[derive(Error, Debug)]
pub enum QuillError {
    // Source transport errors
    #[error("Repository URL not configured")]
    RepoNotConfigured,

    #[error("Invalid repository URL: {0}")]
    InvalidRepoUrl(String),

    #[error("Sync failed for {source_ref}: {reason}")]
    Sync { source_ref: String, reason: String },

    #[error("Publish failed for {source_ref}: {reason}")]
    Publish { source_ref: String, reason: String },

    // Build tool errors
    #[error("Build step '{step}' failed: {reason}")]
    BuildTool { step: String, reason: String },

    #[error("Build step '{step}' timed out after {secs}s")]
    BuildToolTimeout { step: String, secs: u64 },

    #[error("Command not found: {command}")]
    ToolNotFound { command: String },

    #[error("Build interrupted at step '{step}': {reason}")]
    BuildFailed {
        step: String,
        reason: String,
        steps: Vec<StepRecord>,
    },

    // Cache errors
    #[error("Cache refresh failed for {key}: {source}")]
    RefreshFailed {
        key: String,
        #[source]
        source: Box<QuillError>,
    },

    #[error("Cache entry not found: {0}")]
    CacheEntryNotFound(String),

    // Job errors
    #[error("Task not found or expired: {0}")]
    JobNotFound(String),

    // Access errors
    #[error("Access denied for {identity}: {reason}")]
    Forbidden { identity: String, reason: String },

    #[error("Invalid or expired token")]
    Unauthorized,

    #[error("Access token not configured")]
    TokenNotConfigured,

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl QuillError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a sync error
    pub fn sync(source_ref: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Sync {
            source_ref: source_ref.into(),
            reason: reason.into(),
        }
    }

    /// Create a publish error
    pub fn publish(source_ref: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Publish {
            source_ref: source_ref.into(),
            reason: reason.into(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Sync { .. } | Self::Publish { .. } | Self::BuildToolTimeout { .. } => true,
            Self::RefreshFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RepoNotConfigured => Some("Set repo.url in config or export QUILL_REPO_URL"),
            Self::TokenNotConfigured => Some("Set auth.token in config or export QUILL_ACCESS_TOKEN"),
            Self::ToolNotFound { .. } => Some("Make sure Node.js and git are installed and on PATH"),
            Self::Forbidden { .. } => Some("Wait for the temporary ban to expire"),
            _ => None,
        }
    }
}
