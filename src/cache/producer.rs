//! Producers compute fresh payloads for cache entries

use crate::cache::CacheKey;
use crate::content::ContentBuilder;
use crate::error::QuillResult;
use crate::transport::SourceTransport;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Computes the current payload for a key
#[async_trait]
pub trait Producer<T>: Send + Sync {
    async fn produce(&self, key: &CacheKey) -> QuillResult<T>;
}

/// Syncs the repository for a key, then rebuilds content from the checkout
pub struct RepoProducer<B> {
    transport: Arc<dyn SourceTransport>,
    builder: B,
}

impl<B> RepoProducer<B> {
    pub fn new(transport: Arc<dyn SourceTransport>, builder: B) -> Self {
        Self { transport, builder }
    }
}

#[async_trait]
impl<B> Producer<B::Output> for RepoProducer<B>
where
    B: ContentBuilder,
    B::Output: Send + 'static,
{
    async fn produce(&self, key: &CacheKey) -> QuillResult<B::Output> {
        let workdir = self.transport.sync(&key.source, &key.reference).await?;
        debug!("Rebuilding content for {} from {}", key, workdir.display());
        self.builder.build(&workdir).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QuillError;
    use crate::transport::PublishOutcome;
    use std::path::{Path, PathBuf};

    struct FakeTransport {
        fail: bool,
    }

    #[async_trait]
    impl SourceTransport for FakeTransport {
        async fn sync(&self, source: &str, reference: &str) -> QuillResult<PathBuf> {
            if self.fail {
                return Err(QuillError::sync(format!("{}@{}", source, reference), "offline"));
            }
            Ok(PathBuf::from("/checkout").join(reference))
        }

        async fn publish(&self, _: &str, _: &str, _: &str) -> QuillResult<PublishOutcome> {
            Ok(PublishOutcome::NothingToPublish)
        }
    }

    struct PathEcho;

    #[async_trait]
    impl ContentBuilder for PathEcho {
        type Output = String;

        async fn build(&self, workdir: &Path) -> QuillResult<String> {
            Ok(workdir.display().to_string())
        }
    }

    #[tokio::test]
    async fn builds_from_synced_checkout() {
        let producer = RepoProducer::new(Arc::new(FakeTransport { fail: false }), PathEcho);
        let payload = producer.produce(&CacheKey::new("repo", "main")).await.unwrap();
        assert_eq!(PathBuf::from(payload), PathBuf::from("/checkout/main"));
    }

    #[tokio::test]
    async fn sync_failure_skips_build() {
        let producer = RepoProducer::new(Arc::new(FakeTransport { fail: true }), PathEcho);
        let err = producer.produce(&CacheKey::new("repo", "main")).await.unwrap_err();
        assert!(matches!(err, QuillError::Sync { .. }));
    }
}
