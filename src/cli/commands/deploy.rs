//! Deploy command - submit a tracked job and follow it

use super::site_pipeline;
use crate::audit::AuditLog;
use crate::auth::AuthGate;
use crate::cli::args::DeployArgs;
use crate::config::Config;
use crate::error::{QuillError, QuillResult};
use crate::jobs::{JobRecord, JobStatus, RetentionPolicy, TaskTracker};
use crate::service::DeployService;
use crate::ui::{self, TaskSpinner, UiContext};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Execute the deploy command
pub async fn execute(args: DeployArgs, config: &Config) -> QuillResult<()> {
    let ctx = UiContext::detect();
    let credential = args
        .token
        .clone()
        .or_else(|| config.auth.token.clone())
        .unwrap_or_default();

    let service = DeployService::new(
        AuthGate::from_config(&config.auth),
        Arc::new(TaskTracker::new(RetentionPolicy::from(&config.deploy))),
        Arc::new(site_pipeline(config)),
        AuditLog::new(config),
    );

    let (ticket, handle) = service
        .trigger_with_handle(&args.identity, &credential)
        .await?;
    if !args.json {
        ui::intro(&ctx, &format!("Deploy {}", ticket.task_id));
    }

    let mut spinner = TaskSpinner::new(&ctx);
    if !args.json {
        spinner.start(&ticket.message);
    }

    let poll = Duration::from_secs(args.poll_secs.max(1));
    let mut shown = 0;
    let job = loop {
        tokio::time::sleep(poll).await;
        let job = service
            .status(&args.identity, &credential, Some(&ticket.task_id))
            .await?;

        if !args.json {
            for step in &job.steps[shown..] {
                spinner.println(&step_line(step));
            }
            spinner.message(&job.message);
        }
        shown = job.steps.len();

        if job.status.is_terminal() {
            break job;
        }
        debug!("Job {} is {}", job.job_id, job.status);
    };

    if let Err(e) = handle.await {
        debug!("Pipeline task ended abnormally: {}", e);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else if job.status == JobStatus::Success {
        spinner.stop(&job.message);
    } else {
        spinner.stop_error(&job.message);
    }

    finish(job)
}

fn step_line(step: &crate::jobs::StepRecord) -> String {
    if !step.is_success() {
        format!("  [FAIL] {}: {}", step.step, step.error)
    } else if step.unchanged {
        format!("  [--] {}: {}", step.step, step.message)
    } else {
        format!("  [OK] {}", step.step)
    }
}

fn finish(job: JobRecord) -> QuillResult<()> {
    if job.status == JobStatus::Success {
        return Ok(());
    }

    let step = job
        .last_step()
        .map(|s| s.step.clone())
        .unwrap_or_default();
    Err(QuillError::BuildFailed {
        step,
        reason: job.message,
        steps: job.steps,
    })
}
