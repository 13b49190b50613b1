//! Pipeline composition and execution for projection runs.

mod runner;

pub use runner::{Pipeline, PipelineConfig, PipelineOutput};
