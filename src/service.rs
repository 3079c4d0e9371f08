//! Authenticated deploy triggers and status lookups

use crate::audit::{AuditEvent, AuditLog};
use crate::auth::AuthGate;
use crate::error::{QuillError, QuillResult};
use crate::jobs::{JobRecord, TaskTracker};
use crate::pipeline::BuildPipeline;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Returned as soon as a deploy is accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployTicket {
    pub task_id: String,
    pub status: &'static str,
    pub message: String,
    pub triggered_by: String,
}

/// Gate, job registry and pipeline behind one entry point
pub struct DeployService {
    gate: AuthGate,
    tracker: Arc<TaskTracker>,
    pipeline: Arc<BuildPipeline>,
    audit: AuditLog,
}

impl DeployService {
    pub fn new(
        gate: AuthGate,
        tracker: Arc<TaskTracker>,
        pipeline: Arc<BuildPipeline>,
        audit: AuditLog,
    ) -> Self {
        Self {
            gate,
            tracker,
            pipeline,
            audit,
        }
    }

    pub fn tracker(&self) -> &Arc<TaskTracker> {
        &self.tracker
    }

    /// Authorize, submit a job and start the pipeline without waiting for it
    pub async fn trigger(&self, identity: &str, credential: &str) -> QuillResult<DeployTicket> {
        self.trigger_with_handle(identity, credential)
            .await
            .map(|(ticket, _)| ticket)
    }

    /// Like [`trigger`](Self::trigger), also returning the pipeline task handle
    pub async fn trigger_with_handle(
        &self,
        identity: &str,
        credential: &str,
    ) -> QuillResult<(DeployTicket, JoinHandle<()>)> {
        self.authorize(identity, credential).await?;

        let task_id = self.tracker.create(identity);
        info!("Deploy {} accepted from {}", task_id, identity);
        self.audit
            .record(AuditEvent::DeployTriggered {
                task_id: task_id.clone(),
                identity: identity.to_string(),
            })
            .await;

        let tracker = Arc::clone(&self.tracker);
        let pipeline = Arc::clone(&self.pipeline);
        let job_id = task_id.clone();
        let handle = tokio::spawn(async move {
            pipeline.run_tracked(&tracker, &job_id).await;
        });

        let ticket = DeployTicket {
            task_id,
            status: "accepted",
            message: "Deploy task submitted, running in background".to_string(),
            triggered_by: identity.to_string(),
        };
        Ok((ticket, handle))
    }

    /// A job by id, or the caller's latest job when `task_id` is blank
    pub async fn status(
        &self,
        identity: &str,
        credential: &str,
        task_id: Option<&str>,
    ) -> QuillResult<JobRecord> {
        self.authorize(identity, credential).await?;

        match task_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => self
                .tracker
                .get(id)
                .ok_or_else(|| QuillError::JobNotFound(id.to_string())),
            None => self
                .tracker
                .get_latest_by_trigger(identity)
                .ok_or_else(|| QuillError::JobNotFound(format!("latest for {}", identity))),
        }
    }

    async fn authorize(&self, identity: &str, credential: &str) -> QuillResult<()> {
        if let Err(e) = self.gate.authorize(identity, credential) {
            self.audit
                .record(AuditEvent::AccessDenied {
                    identity: identity.to_string(),
                    reason: e.to_string(),
                })
                .await;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{BanPolicy, MemoryAttemptStore};
    use crate::jobs::JobStatus;
    use crate::pipeline::{BuildStep, PipelineSettings, SiteSource, ToolRunner};
    use crate::transport::{PublishOutcome, SourceTransport};
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;

    struct LocalTransport;

    #[async_trait]
    impl SourceTransport for LocalTransport {
        async fn sync(&self, _: &str, _: &str) -> QuillResult<PathBuf> {
            Ok(PathBuf::from("."))
        }

        async fn publish(&self, _: &str, _: &str, _: &str) -> QuillResult<PublishOutcome> {
            Ok(PublishOutcome::NothingToPublish)
        }
    }

    struct EchoRunner;

    #[async_trait]
    impl ToolRunner for EchoRunner {
        async fn run(&self, _: &Path, step: &BuildStep, _: Duration) -> QuillResult<String> {
            Ok(format!("ran {}", step.name))
        }
    }

    fn service(audit: AuditLog) -> DeployService {
        let pipeline = BuildPipeline::new(
            Arc::new(LocalTransport),
            Arc::new(EchoRunner),
            SiteSource::new("git@example.com:me/blog.git", "main"),
            vec![BuildStep::new("generate", ["npx", "hexo", "generate"])],
            PipelineSettings::default(),
        );
        DeployService::new(
            AuthGate::new(
                Some("letmein"),
                BanPolicy::default(),
                Box::new(MemoryAttemptStore::new()),
            ),
            Arc::new(TaskTracker::default()),
            Arc::new(pipeline),
            audit,
        )
    }

    #[tokio::test]
    async fn trigger_runs_job_to_completion() {
        let service = service(AuditLog::disabled());
        let (ticket, handle) = service
            .trigger_with_handle("10.0.0.1", "letmein")
            .await
            .unwrap();

        assert_eq!(ticket.status, "accepted");
        assert_eq!(ticket.triggered_by, "10.0.0.1");
        assert!(ticket.task_id.starts_with("deploy_"));

        handle.await.unwrap();
        let job = service
            .status("10.0.0.1", "letmein", Some(&ticket.task_id))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Success);
        assert_eq!(job.steps.len(), 3);
    }

    #[tokio::test]
    async fn blank_task_id_returns_latest_for_caller() {
        let service = service(AuditLog::disabled());
        let (first, h1) = service.trigger_with_handle("10.0.0.1", "letmein").await.unwrap();
        let (second, h2) = service.trigger_with_handle("10.0.0.1", "letmein").await.unwrap();
        h1.await.unwrap();
        h2.await.unwrap();

        let latest = service.status("10.0.0.1", "letmein", Some("  ")).await.unwrap();
        assert_eq!(latest.job_id, second.task_id);
        assert_ne!(latest.job_id, first.task_id);

        let err = service.status("10.0.0.2", "letmein", None).await.unwrap_err();
        assert!(matches!(err, QuillError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let service = service(AuditLog::disabled());
        let err = service
            .status("10.0.0.1", "letmein", Some("deploy_0_000000"))
            .await
            .unwrap_err();
        assert!(matches!(err, QuillError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn bad_credential_creates_no_job_and_is_audited() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("audit.log");
        let service = service(AuditLog::with_path(&log_path));

        let err = service.trigger("10.0.0.7", "nope").await.unwrap_err();
        assert!(matches!(err, QuillError::Unauthorized));
        assert!(service.tracker().is_empty());

        let content = tokio::fs::read_to_string(&log_path).await.unwrap();
        assert!(content.contains("access_denied"));
        assert!(content.contains("10.0.0.7"));
    }
}
