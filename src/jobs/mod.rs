//! Deploy job tracking
//!
//! Jobs live only in memory and are lost on restart. Every submission
//! sweeps the registry: records older than the max age go first, then the
//! oldest records until the count limit holds.

pub mod record;
pub mod tracker;

pub use record::{JobRecord, JobStatus, JobUpdate, StepRecord, StepStatus};
pub use tracker::{RetentionPolicy, TaskTracker};
