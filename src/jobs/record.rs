//! Job and step records reported to callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Job status
///
/// Transitions are monotone: `queued → running → {success, failure}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Failure,
}

impl JobStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Running => 1,
            Self::Success | Self::Failure => 2,
        }
    }

    /// Whether the job has finished
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }

    /// Whether moving from `self` to `next` keeps the status monotone.
    ///
    /// Staying in a non-terminal state is allowed; a terminal state is final.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        next.rank() >= self.rank()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failure => "failure",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of one pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failure,
}

/// One completed phase of a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step name (e.g. "sync", "npx hexo generate")
    pub step: String,

    pub status: StepStatus,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub error: String,

    /// Captured tool output, truncated to the configured limit
    #[serde(default)]
    pub output: String,

    /// Set when the step succeeded without changing anything (e.g. nothing to publish)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unchanged: bool,
}

impl StepRecord {
    /// A successful step
    pub fn success(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            status: StepStatus::Success,
            message: message.into(),
            error: String::new(),
            output: String::new(),
            unchanged: false,
        }
    }

    /// A failed step
    pub fn failure(step: impl Into<String>, error: impl Into<String>) -> Self {
        let step = step.into();
        Self {
            message: format!("{} failed", step),
            step,
            status: StepStatus::Failure,
            error: error.into(),
            output: String::new(),
            unchanged: false,
        }
    }

    /// Attach output, keeping at most `limit` characters
    pub fn with_output(mut self, output: &str, limit: usize) -> Self {
        self.output = truncate_chars(output, limit);
        self
    }

    /// Mark the step as a no-op success
    pub fn unchanged(mut self) -> Self {
        self.unchanged = true;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// Truncate on a char boundary
pub(crate) fn truncate_chars(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Tracked state of one asynchronous deploy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(rename = "task_id")]
    pub job_id: String,

    pub status: JobStatus,

    pub message: String,

    /// Identity that submitted the job
    pub triggered_by: String,

    /// Steps in execution order
    pub steps: Vec<StepRecord>,

    pub created_at: DateTime<Utc>,

    /// Submission order, used to break created_at ties
    #[serde(skip)]
    pub(crate) seq: u64,
}

impl JobRecord {
    pub(crate) fn new(job_id: String, triggered_by: String, seq: u64) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            message: "Task submitted, waiting to run".to_string(),
            triggered_by,
            steps: Vec::new(),
            created_at: Utc::now(),
            seq,
        }
    }

    /// The last recorded step, if any
    pub fn last_step(&self) -> Option<&StepRecord> {
        self.steps.last()
    }
}

/// Partial update merged into an existing record
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub message: Option<String>,
    pub step: Option<StepRecord>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_step(mut self, step: StepRecord) -> Self {
        self.step = Some(step);
        self
    }
}
