//! Content builders turn a synced checkout into a cacheable payload

use crate::error::{QuillError, QuillResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Builds a payload from a local checkout
#[async_trait]
pub trait ContentBuilder: Send + Sync {
    type Output;

    async fn build(&self, workdir: &Path) -> QuillResult<Self::Output>;
}

/// One post file under the posts directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostEntry {
    /// Path relative to the posts directory, `/`-separated
    pub path: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Listing of every markdown post in a site checkout
#[derive(Debug, Clone, Default, Serialize)]
pub struct PostIndex {
    pub posts: Vec<PostEntry>,
}

impl PostIndex {
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// Lists markdown files under `source/_posts` (the Hexo layout)
#[derive(Debug, Clone)]
pub struct PostIndexBuilder {
    posts_dir: PathBuf,
}

impl PostIndexBuilder {
    pub fn new() -> Self {
        Self {
            posts_dir: PathBuf::from("source").join("_posts"),
        }
    }

    /// Use a different posts directory, relative to the checkout root
    pub fn with_posts_dir(posts_dir: impl Into<PathBuf>) -> Self {
        Self {
            posts_dir: posts_dir.into(),
        }
    }
}

impl Default for PostIndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentBuilder for PostIndexBuilder {
    type Output = PostIndex;

    async fn build(&self, workdir: &Path) -> QuillResult<PostIndex> {
        let root = workdir.join(&self.posts_dir);
        if !root.is_dir() {
            return Ok(PostIndex::default());
        }

        let mut posts = Vec::new();
        let mut pending = vec![root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| QuillError::io(format!("reading {}", dir.display()), e))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| QuillError::io(format!("reading {}", dir.display()), e))?
            {
                let path = entry.path();
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|e| QuillError::io(format!("stat {}", path.display()), e))?;

                if meta.is_dir() {
                    pending.push(path);
                } else if path.extension().is_some_and(|ext| ext == "md") {
                    let relative = path
                        .strip_prefix(&root)
                        .unwrap_or(&path)
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");

                    posts.push(PostEntry {
                        path: relative,
                        size: meta.len(),
                        modified: meta.modified().ok().map(DateTime::<Utc>::from),
                    });
                }
            }
        }

        posts.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(PostIndex { posts })
    }
}
