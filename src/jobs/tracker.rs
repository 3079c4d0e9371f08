//! In-memory registry of deploy jobs with bounded retention

use crate::config::schema::DeployConfig;
use crate::jobs::record::{JobRecord, JobUpdate};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

/// Age and count limits applied on every submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age: Duration,
    pub max_count: usize,
}

impl RetentionPolicy {
    pub fn new(max_age: Duration, max_count: usize) -> Self {
        Self { max_age, max_count }
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from(&DeployConfig::default())
    }
}

impl From<&DeployConfig> for RetentionPolicy {
    fn from(config: &DeployConfig) -> Self {
        Self {
            max_age: Duration::seconds(config.max_task_age_secs.min(MAX_AGE_SECS) as i64),
            max_count: config.max_task_count,
        }
    }
}

// Largest age chrono can represent as a TimeDelta
const MAX_AGE_SECS: u64 = i64::MAX as u64 / 1_000;

#[derive(Default)]
struct Registry {
    jobs: HashMap<String, JobRecord>,
    next_seq: u64,
}

/// Task tracker owning every job record.
///
/// The registry lock is held only for map operations; callers receive clones.
pub struct TaskTracker {
    registry: Mutex<Registry>,
    policy: RetentionPolicy,
}

impl TaskTracker {
    /// Create a tracker with the given retention policy
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            policy,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit a new job and return its id.
    ///
    /// Retention runs first and leaves room for the new record, so the
    /// registry never holds more than `max_count` jobs.
    pub fn create(&self, triggered_by: &str) -> String {
        let mut registry = self.lock();
        self.apply_retention(&mut registry);

        let mut job_id = new_job_id();
        while registry.jobs.contains_key(&job_id) {
            job_id = new_job_id();
        }

        let seq = registry.next_seq;
        registry.next_seq += 1;
        registry.jobs.insert(
            job_id.clone(),
            JobRecord::new(job_id.clone(), triggered_by.to_string(), seq),
        );

        debug!("Created job {} for {}", job_id, triggered_by);
        job_id
    }

    /// Merge an update into a job. Unknown ids are ignored.
    ///
    /// A status that would move the job backwards is dropped; the rest of the
    /// update still applies.
    pub fn update(&self, job_id: &str, update: JobUpdate) {
        let mut registry = self.lock();
        let Some(job) = registry.jobs.get_mut(job_id) else {
            debug!("Ignoring update for unknown job {}", job_id);
            return;
        };

        if let Some(status) = update.status {
            if job.status.can_transition_to(status) {
                job.status = status;
            } else {
                debug!(
                    "Ignoring status change {} -> {} for job {}",
                    job.status, status, job_id
                );
            }
        }
        if let Some(message) = update.message {
            job.message = message;
        }
        if let Some(step) = update.step {
            job.steps.push(step);
        }
    }

    /// Snapshot of one job
    pub fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.lock().jobs.get(job_id).cloned()
    }

    /// Most recently created job for a trigger identity
    pub fn get_latest_by_trigger(&self, triggered_by: &str) -> Option<JobRecord> {
        self.lock()
            .jobs
            .values()
            .filter(|job| job.triggered_by == triggered_by)
            .max_by_key(|job| (job.created_at, job.seq))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn apply_retention(&self, registry: &mut Registry) {
        let before = registry.jobs.len();
        if let Some(cutoff) = Utc::now().checked_sub_signed(self.policy.max_age) {
            registry.jobs.retain(|_, job| job.created_at >= cutoff);
        }

        let limit = self.policy.max_count.saturating_sub(1);
        if registry.jobs.len() > limit {
            let mut by_age: Vec<_> = registry
                .jobs
                .values()
                .map(|job| (job.created_at, job.seq, job.job_id.clone()))
                .collect();
            by_age.sort();

            let excess = registry.jobs.len() - limit;
            for (_, _, job_id) in by_age.into_iter().take(excess) {
                registry.jobs.remove(&job_id);
            }
        }

        let removed = before - registry.jobs.len();
        if removed > 0 {
            debug!("Retention removed {} job(s)", removed);
        }
    }
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

/// Timestamp-prefixed id with a random suffix
fn new_job_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("deploy_{}_{}", Utc::now().timestamp(), &suffix[..6])
}
