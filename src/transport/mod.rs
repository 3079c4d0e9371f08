//! Source sync and publish
//!
//! The pipeline and the cache only see the [`SourceTransport`] trait.
//! [`GitTransport`] implements it with the `git` CLI.

mod git;

pub use git::{repo_dir_name, GitTransport};

use crate::error::QuillResult;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;

/// Result of a publish that did not fail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// Changes were committed and pushed
    Published { commit: String },
    /// The working tree had nothing to commit
    NothingToPublish,
}

/// Sync and publish a content source
#[async_trait]
pub trait SourceTransport: Send + Sync {
    /// Make the source available locally at its latest state, returning the checkout path
    async fn sync(&self, source: &str, reference: &str) -> QuillResult<PathBuf>;

    /// Commit local changes and push them to the source
    async fn publish(
        &self,
        source: &str,
        reference: &str,
        message: &str,
    ) -> QuillResult<PublishOutcome>;
}
