//! Site build pipeline
//!
//! A run is `sync`, then each configured build tool in order, then `publish`.
//! The first failing step ends the run; later steps never execute.

pub mod executor;
pub mod tool;

pub use executor::{
    BuildInterrupted, BuildPipeline, PipelineSettings, SiteSource, StepObserver, PUBLISH_STEP,
    SYNC_STEP,
};
pub use tool::{BuildStep, ProcessToolRunner, ToolRunner};
