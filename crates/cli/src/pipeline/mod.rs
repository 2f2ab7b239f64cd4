//! Simulation pipeline: pulse train, pickup scheduling and channel polling.

mod orchestrator;
mod stats;

pub use orchestrator::{Pipeline, PipelineConfig};
pub use stats::PipelineStats;
