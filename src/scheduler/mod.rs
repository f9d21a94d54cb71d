//! Scheduled pipeline execution.

pub mod daemon;

pub use daemon::PipelineScheduler;
