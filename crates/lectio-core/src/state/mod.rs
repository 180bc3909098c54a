//! Run phase state machine.
//!
//! ```text
//! parse_request -> plan_study -> generate_content -> validate_references
//!   -> review_quality -> finalize -> completed
//! (any non-terminal phase) -> failed
//! ```
//!
//! Each phase has a fixed progress checkpoint recorded when it is entered,
//! so progress is coarse but never decreases.

use lectio_db::models::WorkflowPhase;

/// Phases executed by the orchestrator, in order.
pub const PIPELINE: [WorkflowPhase; 7] = [
    WorkflowPhase::ParseRequest,
    WorkflowPhase::PlanStudy,
    WorkflowPhase::GenerateContent,
    WorkflowPhase::ValidateReferences,
    WorkflowPhase::ReviewQuality,
    WorkflowPhase::Finalize,
    WorkflowPhase::Completed,
];

pub struct RunStateMachine;

impl RunStateMachine {
    /// Whether `from -> to` is an edge of the phase graph.
    pub fn is_valid_transition(from: WorkflowPhase, to: WorkflowPhase) -> bool {
        use WorkflowPhase::*;
        matches!(
            (from, to),
            (ParseRequest, PlanStudy)
                | (PlanStudy, GenerateContent)
                | (GenerateContent, ValidateReferences)
                | (ValidateReferences, ReviewQuality)
                | (ReviewQuality, Finalize)
                | (Finalize, Completed)
        ) || (to == Failed && !Self::is_terminal(from))
    }

    pub fn is_terminal(phase: WorkflowPhase) -> bool {
        matches!(phase, WorkflowPhase::Completed | WorkflowPhase::Failed)
    }

    /// The phase after `phase` on the success path.
    pub fn next(phase: WorkflowPhase) -> Option<WorkflowPhase> {
        let index = PIPELINE.iter().position(|p| *p == phase)?;
        PIPELINE.get(index + 1).copied()
    }

    /// Progress percentage recorded on entering `phase`. `None` for
    /// `failed`, which keeps whatever progress was reached.
    pub fn checkpoint(phase: WorkflowPhase) -> Option<i32> {
        match phase {
            WorkflowPhase::ParseRequest => Some(0),
            WorkflowPhase::PlanStudy => Some(10),
            WorkflowPhase::GenerateContent => Some(25),
            WorkflowPhase::ValidateReferences => Some(60),
            WorkflowPhase::ReviewQuality => Some(75),
            WorkflowPhase::Finalize => Some(90),
            WorkflowPhase::Completed => Some(100),
            WorkflowPhase::Failed => None,
        }
    }
}
