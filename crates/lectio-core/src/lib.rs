//! Study generation pipeline: turns a short brief into a validated,
//! reviewed multi-day study.

pub mod citation;
pub mod config;
pub mod error;
pub mod generator;
pub mod interpret;
pub mod llm;
pub mod orchestrator;
pub mod prompt;
pub mod request;
pub mod review;
pub mod state;
pub mod store;
pub mod study;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use orchestrator::{Pipeline, RunOutcome, RunService, StudyResult};
