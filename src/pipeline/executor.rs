//! Ordered sync → build → publish execution

use crate::config::Config;
use crate::error::{QuillError, QuillResult};
use crate::jobs::record::truncate_chars;
use crate::jobs::{JobStatus, JobUpdate, StepRecord, TaskTracker};
use crate::pipeline::tool::{BuildStep, ToolRunner};
use crate::transport::{PublishOutcome, SourceTransport};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Name of the first step
pub const SYNC_STEP: &str = "sync";
/// Name of the last step
pub const PUBLISH_STEP: &str = "publish";

/// Repository the pipeline builds and publishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSource {
    pub url: Option<String>,
    pub branch: String,
}

impl SiteSource {
    pub fn new(url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            branch: branch.into(),
        }
    }

    fn url(&self) -> QuillResult<&str> {
        self.url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or(QuillError::RepoNotConfigured)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub tool_timeout: Duration,
    pub output_limit: usize,
    pub publish_message: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let deploy = crate::config::schema::DeployConfig::default();
        Self {
            tool_timeout: deploy.tool_timeout(),
            output_limit: deploy.step_output_limit,
            publish_message: deploy.publish_message,
        }
    }
}

/// A step failed; carries every step recorded so far, the failing one last
#[derive(Debug)]
pub struct BuildInterrupted {
    pub step: String,
    pub error: QuillError,
    pub steps: Vec<StepRecord>,
}

impl From<BuildInterrupted> for QuillError {
    fn from(interrupted: BuildInterrupted) -> Self {
        QuillError::BuildFailed {
            step: interrupted.step,
            reason: interrupted.error.to_string(),
            steps: interrupted.steps,
        }
    }
}

/// Receives each step record as soon as the step finishes
pub trait StepObserver: Send {
    fn on_step(&mut self, record: &StepRecord, is_final: bool);
}

/// Observer for runs without a tracked job
struct Untracked;

impl StepObserver for Untracked {
    fn on_step(&mut self, _record: &StepRecord, _is_final: bool) {}
}

/// Writes each step into a tracked job
struct JobObserver<'a> {
    tracker: &'a TaskTracker,
    job_id: &'a str,
}

impl StepObserver for JobObserver<'_> {
    fn on_step(&mut self, record: &StepRecord, is_final: bool) {
        let status = if is_final && record.is_success() {
            JobStatus::Success
        } else {
            JobStatus::Running
        };
        let message = if record.message.is_empty() {
            format!("Running: {}", record.step)
        } else {
            record.message.clone()
        };

        self.tracker.update(
            self.job_id,
            JobUpdate::status(status)
                .with_message(message)
                .with_step(record.clone()),
        );
    }
}

/// Runs sync, the configured build steps, then publish, stopping at the first failure
pub struct BuildPipeline {
    transport: Arc<dyn SourceTransport>,
    runner: Arc<dyn ToolRunner>,
    source: SiteSource,
    steps: Vec<BuildStep>,
    settings: PipelineSettings,
}

impl BuildPipeline {
    pub fn new(
        transport: Arc<dyn SourceTransport>,
        runner: Arc<dyn ToolRunner>,
        source: SiteSource,
        steps: Vec<BuildStep>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            transport,
            runner,
            source,
            steps,
            settings,
        }
    }

    /// Build a pipeline from configuration
    pub fn from_config(
        config: &Config,
        transport: Arc<dyn SourceTransport>,
        runner: Arc<dyn ToolRunner>,
    ) -> Self {
        Self::new(
            transport,
            runner,
            SiteSource {
                url: config.repo.url.clone(),
                branch: config.repo.branch.clone(),
            },
            config.deploy.steps.iter().map(BuildStep::from).collect(),
            PipelineSettings {
                tool_timeout: config.deploy.tool_timeout(),
                output_limit: config.deploy.step_output_limit,
                publish_message: config.deploy.publish_message.clone(),
            },
        )
    }

    /// Names of every step in execution order
    pub fn step_names(&self) -> Vec<String> {
        std::iter::once(SYNC_STEP.to_string())
            .chain(self.steps.iter().map(|s| s.name.clone()))
            .chain(std::iter::once(PUBLISH_STEP.to_string()))
            .collect()
    }

    /// Run without a job and return the step records.
    ///
    /// A failed step becomes `QuillError::BuildFailed` with the partial steps.
    pub async fn run(&self) -> QuillResult<Vec<StepRecord>> {
        let steps = self.execute(&mut Untracked).await?;
        info!("Build and publish completed ({} steps)", steps.len());
        Ok(steps)
    }

    /// Run for a tracked job, writing progress into the tracker.
    ///
    /// The job always ends in a terminal state.
    pub async fn run_tracked(&self, tracker: &TaskTracker, job_id: &str) {
        tracker.update(
            job_id,
            JobUpdate::status(JobStatus::Running).with_message("Deploy started"),
        );

        let mut observer = JobObserver { tracker, job_id };
        match self.execute(&mut observer).await {
            Ok(steps) => {
                info!("Job {} completed ({} steps)", job_id, steps.len());
                tracker.update(
                    job_id,
                    JobUpdate::status(JobStatus::Success)
                        .with_message(stamped("site built and published")),
                );
            }
            Err(interrupted) => {
                warn!(
                    "Job {} failed at {}: {}",
                    job_id, interrupted.step, interrupted.error
                );
                tracker.update(
                    job_id,
                    JobUpdate::status(JobStatus::Failure).with_message(stamped(&format!(
                        "build failed at {}: {}",
                        interrupted.step,
                        truncate_chars(&interrupted.error.to_string(), self.settings.output_limit)
                    ))),
                );
            }
        }
    }

    async fn execute(
        &self,
        observer: &mut dyn StepObserver,
    ) -> Result<Vec<StepRecord>, BuildInterrupted> {
        let mut steps = Vec::new();

        info!("Syncing site source");
        let workdir = match self.sync().await {
            Ok(path) => {
                let record = StepRecord::success(SYNC_STEP, stamped("source synced"));
                record_step(&mut steps, observer, record, false);
                path
            }
            Err(e) => return Err(self.interrupt(steps, observer, SYNC_STEP, e)),
        };

        for step in &self.steps {
            info!("Running: {}", step.name);
            match self
                .runner
                .run(&workdir, step, self.settings.tool_timeout)
                .await
            {
                Ok(output) => {
                    let record =
                        StepRecord::success(&step.name, stamped(&format!("{} succeeded", step.name)))
                            .with_output(&output, self.settings.output_limit);
                    record_step(&mut steps, observer, record, false);
                }
                Err(e) => return Err(self.interrupt(steps, observer, &step.name, e)),
            }
        }

        info!("Publishing build output");
        match self.publish().await {
            Ok(PublishOutcome::Published { commit }) => {
                let record = StepRecord::success(
                    PUBLISH_STEP,
                    stamped(&format!("published commit {}", commit)),
                );
                record_step(&mut steps, observer, record, true);
            }
            Ok(PublishOutcome::NothingToPublish) => {
                let record = StepRecord::success(PUBLISH_STEP, "nothing to publish").unchanged();
                record_step(&mut steps, observer, record, true);
            }
            Err(e) => return Err(self.interrupt(steps, observer, PUBLISH_STEP, e)),
        }

        Ok(steps)
    }

    /// Record the failing step, its error capped like tool output
    fn interrupt(
        &self,
        mut steps: Vec<StepRecord>,
        observer: &mut dyn StepObserver,
        step: &str,
        error: QuillError,
    ) -> BuildInterrupted {
        let reason = truncate_chars(&error.to_string(), self.settings.output_limit);
        let record = StepRecord::failure(step, reason);
        record_step(&mut steps, observer, record, false);
        BuildInterrupted {
            step: step.to_string(),
            error,
            steps,
        }
    }

    async fn sync(&self) -> QuillResult<PathBuf> {
        let url = self.source.url()?;
        self.transport.sync(url, &self.source.branch).await
    }

    async fn publish(&self) -> QuillResult<PublishOutcome> {
        let url = self.source.url()?;
        self.transport
            .publish(url, &self.source.branch, &self.settings.publish_message)
            .await
    }
}

fn record_step(
    steps: &mut Vec<StepRecord>,
    observer: &mut dyn StepObserver,
    record: StepRecord,
    is_final: bool,
) {
    observer.on_step(&record, is_final);
    steps.push(record);
}

fn stamped(text: &str) -> String {
    format!("{} - {}", Utc::now().format("%Y-%m-%d %H:%M:%S"), text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::StepStatus;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTransport {
        fail_sync: bool,
        fail_publish: bool,
        nothing_to_publish: bool,
        publishes: AtomicUsize,
    }

    #[async_trait]
    impl SourceTransport for FakeTransport {
        async fn sync(&self, source: &str, reference: &str) -> QuillResult<PathBuf> {
            if self.fail_sync {
                return Err(QuillError::sync(format!("{}@{}", source, reference), "pull rejected"));
            }
            Ok(PathBuf::from("/srv/site"))
        }

        async fn publish(&self, source: &str, reference: &str, _: &str) -> QuillResult<PublishOutcome> {
            self.publishes.fetch_add(1, Ordering::SeqCst);
            if self.fail_publish {
                return Err(QuillError::publish(format!("{}@{}", source, reference), "push rejected"));
            }
            if self.nothing_to_publish {
                return Ok(PublishOutcome::NothingToPublish);
            }
            Ok(PublishOutcome::Published {
                commit: "abc1234".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct FakeRunner {
        fail_on: Option<&'static str>,
        output: String,
        invoked: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ToolRunner for FakeRunner {
        async fn run(&self, _workdir: &Path, step: &BuildStep, _timeout: Duration) -> QuillResult<String> {
            self.invoked.lock().unwrap().push(step.name.clone());
            if self.fail_on == Some(step.name.as_str()) {
                return Err(QuillError::BuildTool {
                    step: step.name.clone(),
                    reason: "exit status 1".to_string(),
                });
            }
            Ok(self.output.clone())
        }
    }

    fn pipeline(
        transport: Arc<FakeTransport>,
        runner: Arc<FakeRunner>,
        tools: &[&str],
    ) -> BuildPipeline {
        BuildPipeline::new(
            transport,
            runner,
            SiteSource::new("git@example.com:me/blog.git", "main"),
            tools.iter().map(|name| BuildStep::new(*name, [*name])).collect(),
            PipelineSettings::default(),
        )
    }

    #[tokio::test]
    async fn failure_at_second_step_stops_pipeline() {
        let transport = Arc::new(FakeTransport::default());
        let runner = Arc::new(FakeRunner {
            fail_on: Some("install"),
            ..Default::default()
        });
        let pipeline = pipeline(Arc::clone(&transport), Arc::clone(&runner), &["install", "generate"]);
        assert_eq!(pipeline.step_names().len(), 4);

        let tracker = TaskTracker::default();
        let job_id = tracker.create("alice");
        pipeline.run_tracked(&tracker, &job_id).await;

        let job = tracker.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failure);
        assert_eq!(job.steps.len(), 2);
        assert_eq!(job.steps[0].step, SYNC_STEP);
        assert_eq!(job.steps[0].status, StepStatus::Success);
        assert_eq!(job.steps[1].step, "install");
        assert_eq!(job.steps[1].status, StepStatus::Failure);
        assert!(job.steps[1].error.contains("exit status 1"));
        assert!(job.message.contains("build failed at install"));

        assert_eq!(*runner.invoked.lock().unwrap(), ["install"]);
        assert_eq!(transport.publishes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn successful_run_records_every_step() {
        let transport = Arc::new(FakeTransport::default());
        let runner = Arc::new(FakeRunner::default());
        let pipeline = pipeline(transport, runner, &["install", "clean", "generate"]);

        let tracker = TaskTracker::default();
        let job_id = tracker.create("alice");
        pipeline.run_tracked(&tracker, &job_id).await;

        let job = tracker.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Success);
        let names: Vec<_> = job.steps.iter().map(|s| s.step.as_str()).collect();
        assert_eq!(names, [SYNC_STEP, "install", "clean", "generate", PUBLISH_STEP]);
        assert!(job.steps.iter().all(StepRecord::is_success));
        assert!(job.steps[4].message.contains("abc1234"));
    }

    #[tokio::test]
    async fn intermediate_steps_keep_job_running() {
        struct Recorder(Vec<(String, bool)>);

        impl StepObserver for Recorder {
            fn on_step(&mut self, record: &StepRecord, is_final: bool) {
                self.0.push((record.step.clone(), is_final));
            }
        }

        let pipeline = pipeline(
            Arc::new(FakeTransport::default()),
            Arc::new(FakeRunner::default()),
            &["install", "generate"],
        );
        let mut recorder = Recorder(Vec::new());
        pipeline.execute(&mut recorder).await.unwrap();

        let finals: Vec<_> = recorder.0.iter().filter(|(_, f)| *f).collect();
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].0, PUBLISH_STEP);
    }

    #[tokio::test]
    async fn nothing_to_publish_is_success() {
        let transport = Arc::new(FakeTransport {
            nothing_to_publish: true,
            ..Default::default()
        });
        let pipeline = pipeline(transport, Arc::new(FakeRunner::default()), &["generate"]);

        let tracker = TaskTracker::default();
        let job_id = tracker.create("alice");
        pipeline.run_tracked(&tracker, &job_id).await;

        let job = tracker.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Success);
        let publish = job.last_step().unwrap();
        assert_eq!(publish.step, PUBLISH_STEP);
        assert!(publish.is_success());
        assert!(publish.unchanged);
        assert_eq!(publish.message, "nothing to publish");
    }

    #[tokio::test]
    async fn publish_failure_fails_job_after_build() {
        let transport = Arc::new(FakeTransport {
            fail_publish: true,
            ..Default::default()
        });
        let pipeline = pipeline(transport, Arc::new(FakeRunner::default()), &["generate"]);

        let tracker = TaskTracker::default();
        let job_id = tracker.create("alice");
        pipeline.run_tracked(&tracker, &job_id).await;

        let job = tracker.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failure);
        assert_eq!(job.steps.len(), 3);
        assert_eq!(job.steps[2].status, StepStatus::Failure);
        assert!(job.steps[2].error.contains("push rejected"));
    }

    #[tokio::test]
    async fn sync_failure_runs_no_tools() {
        let transport = Arc::new(FakeTransport {
            fail_sync: true,
            ..Default::default()
        });
        let runner = Arc::new(FakeRunner::default());
        let pipeline = pipeline(transport, Arc::clone(&runner), &["install"]);

        let err = pipeline.run().await.unwrap_err();
        match err {
            QuillError::BuildFailed { step, steps, .. } => {
                assert_eq!(step, SYNC_STEP);
                assert_eq!(steps.len(), 1);
                assert_eq!(steps[0].status, StepStatus::Failure);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(runner.invoked.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_repo_url_fails_sync() {
        let pipeline = BuildPipeline::new(
            Arc::new(FakeTransport::default()),
            Arc::new(FakeRunner::default()),
            SiteSource {
                url: None,
                branch: "main".to_string(),
            },
            vec![],
            PipelineSettings::default(),
        );

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, QuillError::BuildFailed { ref step, .. } if step == SYNC_STEP));
        assert!(err.to_string().contains("not configured"));
    }

    #[tokio::test]
    async fn untracked_run_returns_steps_with_capped_output() {
        let runner = Arc::new(FakeRunner {
            output: "x".repeat(2_000),
            ..Default::default()
        });
        let pipeline = pipeline(Arc::new(FakeTransport::default()), runner, &["generate"]);

        let steps = pipeline.run().await.unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].output.len(), PipelineSettings::default().output_limit);
    }

    #[tokio::test]
    async fn updates_to_evicted_job_are_ignored() {
        let tracker = TaskTracker::default();
        let pipeline = pipeline(
            Arc::new(FakeTransport::default()),
            Arc::new(FakeRunner::default()),
            &["generate"],
        );

        pipeline.run_tracked(&tracker, "deploy_0_gone00").await;
        assert!(tracker.is_empty());
    }

    struct LoudRunner;

    #[async_trait]
    impl ToolRunner for LoudRunner {
        async fn run(&self, _: &Path, step: &BuildStep, _: Duration) -> QuillResult<String> {
            Err(QuillError::BuildTool {
                step: step.name.clone(),
                reason: "x".repeat(20_000),
            })
        }
    }

    #[tokio::test]
    async fn failure_output_is_capped() {
        let limit = PipelineSettings::default().output_limit;
        let pipeline = pipeline_with_runner(Arc::new(LoudRunner), &["install"]);

        let tracker = TaskTracker::default();
        let job_id = tracker.create("alice");
        pipeline.run_tracked(&tracker, &job_id).await;

        let job = tracker.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failure);
        let failed = job.last_step().unwrap();
        assert_eq!(failed.error.chars().count(), limit);
        assert!(job.message.len() < limit + 100);
    }

    /// Blocks one named step until released
    struct GatedRunner {
        gated: &'static str,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl ToolRunner for GatedRunner {
        async fn run(&self, _: &Path, step: &BuildStep, _: Duration) -> QuillResult<String> {
            if step.name == self.gated {
                self.release.notified().await;
            }
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn tracked_job_stays_running_between_steps() {
        let runner = Arc::new(GatedRunner {
            gated: "generate",
            release: tokio::sync::Notify::new(),
        });
        let pipeline = Arc::new(pipeline_with_runner(runner.clone(), &["install", "generate"]));
        let tracker = Arc::new(TaskTracker::default());
        let job_id = tracker.create("alice");

        let handle = {
            let (pipeline, tracker, job_id) = (Arc::clone(&pipeline), Arc::clone(&tracker), job_id.clone());
            tokio::spawn(async move { pipeline.run_tracked(&tracker, &job_id).await })
        };

        let mut job = tracker.get(&job_id).unwrap();
        for _ in 0..200 {
            if job.steps.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            job = tracker.get(&job_id).unwrap();
        }
        assert_eq!(job.steps.len(), 2);
        assert!(job.steps.iter().all(StepRecord::is_success));
        assert_eq!(job.status, JobStatus::Running);

        runner.release.notify_one();
        handle.await.unwrap();
        assert_eq!(tracker.get(&job_id).unwrap().status, JobStatus::Success);
    }

    fn pipeline_with_runner(runner: Arc<dyn ToolRunner>, tools: &[&str]) -> BuildPipeline {
        BuildPipeline::new(
            Arc::new(FakeTransport::default()),
            runner,
            SiteSource::new("git@example.com:me/blog.git", "main"),
            tools.iter().map(|name| BuildStep::new(*name, [*name])).collect(),
            PipelineSettings::default(),
        )
    }
}
