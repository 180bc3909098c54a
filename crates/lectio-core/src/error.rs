//! Error taxonomy for the generation pipeline.
//!
//! Per-call failures (`InterpretError`, `LlmError`, `LookupError`) are
//! absorbed at day or reference granularity. `PipelineError` is what the
//! surrounding application sees.

use thiserror::Error;
use uuid::Uuid;

use lectio_db::models::{RunStatus, WorkflowPhase};

use crate::request::RequestValidationError;

/// Errors surfaced by the run service.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request was malformed; no run was created.
    #[error("invalid request: {0}")]
    Validation(#[from] RequestValidationError),

    #[error("run {0} not found")]
    NotFound(Uuid),

    #[error("run {run_id} is {status}; the result is only available once it has completed")]
    ResultNotReady { run_id: Uuid, status: RunStatus },

    #[error("run {run_id} has already finished with status {status}")]
    AlreadyFinished { run_id: Uuid, status: RunStatus },

    /// Unrecoverable failure that froze the run in `failed`.
    #[error("run failed during {phase}: {message}")]
    RunFailed {
        phase: WorkflowPhase,
        message: String,
    },

    /// Persistence or other infrastructure failure.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
