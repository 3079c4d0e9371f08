//! Git CLI transport

use crate::error::{QuillError, QuillResult};
use crate::transport::{PublishOutcome, SourceTransport};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Local directory name for a repository URL: `owner-repo`.
///
/// Accepts `git@host:owner/repo.git` and `https://host/owner/repo(.git)`.
pub fn repo_dir_name(url: &str) -> QuillResult<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    let mut parts = trimmed.rsplitn(3, |c: char| c == '/' || c == ':');
    let repo = parts.next().unwrap_or_default();
    let owner = parts.next().unwrap_or_default();
    let host = parts.next().unwrap_or_default();

    if repo.is_empty() || owner.is_empty() || host.is_empty() {
        return Err(QuillError::InvalidRepoUrl(url.to_string()));
    }

    Ok(format!("{}-{}", owner, repo).replace('@', ""))
}

/// Clones repositories under a base directory and drives them with `git`.
///
/// Git commands are serialized so a background refresh and a deploy never
/// touch the same checkout at once.
pub struct GitTransport {
    repos_dir: PathBuf,
    git_lock: Mutex<()>,
}

impl GitTransport {
    pub fn new(repos_dir: impl Into<PathBuf>) -> Self {
        Self {
            repos_dir: repos_dir.into(),
            git_lock: Mutex::new(()),
        }
    }

    /// Local checkout path for a repository URL
    pub fn checkout_path(&self, url: &str) -> QuillResult<PathBuf> {
        if url.trim().is_empty() {
            return Err(QuillError::RepoNotConfigured);
        }
        Ok(self.repos_dir.join(repo_dir_name(url)?))
    }

    /// Execute a git command and return the output
    async fn git(&self, cwd: &Path, args: &[&str]) -> QuillResult<Output> {
        debug!("Executing: git {:?} in {}", args, cwd.display());

        Command::new("git")
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| QuillError::command_failed(format!("git {:?}", args), e))
    }

    /// Run a git command, turning a non-zero exit into `on_error(stderr)`
    async fn git_ok(
        &self,
        cwd: &Path,
        args: &[&str],
        on_error: impl FnOnce(String) -> QuillError,
    ) -> QuillResult<String> {
        let output = self.git(cwd, args).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(on_error(failure_text(&output)))
        }
    }

    async fn ensure_cloned(&self, url: &str, branch: &str) -> QuillResult<PathBuf> {
        let path = self.checkout_path(url)?;
        if path.join(".git").exists() {
            debug!("Repository already cloned at {}", path.display());
            return Ok(path);
        }

        tokio::fs::create_dir_all(&self.repos_dir)
            .await
            .map_err(|e| QuillError::io(format!("creating {}", self.repos_dir.display()), e))?;

        info!("Cloning {} into {}", url, path.display());
        let target = path.to_string_lossy().to_string();
        self.git_ok(
            &self.repos_dir,
            &["clone", "--branch", branch, url, target.as_str()],
            |reason| QuillError::sync(source_ref(url, branch), format!("clone failed: {}", reason)),
        )
        .await?;

        Ok(path)
    }
}

#[async_trait]
impl SourceTransport for GitTransport {
    async fn sync(&self, source: &str, reference: &str) -> QuillResult<PathBuf> {
        let _guard = self.git_lock.lock().await;
        let path = self.ensure_cloned(source, reference).await?;

        info!("Pulling {}", source_ref(source, reference));
        self.git_ok(&path, &["pull", "origin", reference], |reason| {
            QuillError::sync(source_ref(source, reference), reason)
        })
        .await?;

        Ok(path)
    }

    async fn publish(
        &self,
        source: &str,
        reference: &str,
        message: &str,
    ) -> QuillResult<PublishOutcome> {
        let _guard = self.git_lock.lock().await;
        let path = self.ensure_cloned(source, reference).await?;
        let publish_err = |reason: String| QuillError::publish(source_ref(source, reference), reason);

        let changes = self
            .git_ok(&path, &["status", "--porcelain"], publish_err)
            .await?;
        if changes.is_empty() {
            info!("No changes to publish for {}", source_ref(source, reference));
            return Ok(PublishOutcome::NothingToPublish);
        }

        self.git_ok(&path, &["add", "--all"], publish_err).await?;
        self.git_ok(&path, &["commit", "-m", message], publish_err).await?;
        let commit = self
            .git_ok(&path, &["rev-parse", "--short", "HEAD"], publish_err)
            .await?;

        info!("Pushing {} to {}", commit, source_ref(source, reference));
        self.git_ok(&path, &["push", "origin", reference], publish_err)
            .await?;

        Ok(PublishOutcome::Published { commit })
    }
}

fn source_ref(source: &str, reference: &str) -> String {
    format!("{}@{}", source, reference)
}

fn failure_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("git exited with {}", output.status)
    } else {
        stderr
    }
}
