//! Drives one run through the phase pipeline.
//!
//! Every phase transition is persisted, together with a history entry,
//! before the phase's work starts. Each phase's output is checkpointed as
//! an artifact when it finishes. Cancellation is observed at every phase
//! boundary, and between calls during day generation and review.
//!
//! Only two things fail a run: a planning call that yields no usable plan,
//! and a storage or publication error. Everything else degrades in place
//! (fallback days, unavailable references, unreviewed days).

pub mod repair;
pub mod service;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use lectio_db::models::{ArtifactKind, GenerationRequest, RunStatus, WorkflowPhase};

use crate::citation::{self, CitationValidator, ReferenceLookup, ReferenceReport};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::generator::ContentGenerator;
use crate::llm::TextGenerator;
use crate::prompt;
use crate::review::{BatchReviewSummary, Recommendation, Reviewer};
use crate::state::RunStateMachine;
use crate::store::{PublishedDay, PublishedStudy, Publisher, ReferenceCache, RunStore, RunUpdate};
use crate::study::{self, DayOutcome, StudyPlan};

pub use service::{RunService, RunSnapshot};

/// Collaborators and tunables shared by every run.
pub struct Pipeline {
    store: Arc<dyn RunStore>,
    publisher: Arc<dyn Publisher>,
    generator: ContentGenerator,
    validator: CitationValidator,
    reviewer: Reviewer,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        llm: Arc<dyn TextGenerator>,
        lookup: Arc<dyn ReferenceLookup>,
        cache: Arc<dyn ReferenceCache>,
        store: Arc<dyn RunStore>,
        publisher: Arc<dyn Publisher>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            generator: ContentGenerator::new(Arc::clone(&llm), config.clone()),
            reviewer: Reviewer::new(llm, config.clone()),
            validator: CitationValidator::new(lookup, cache, config.clone()),
            store,
            publisher,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

/// Everything a successful run produced. Stored as the `result` artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyResult {
    pub run_id: Uuid,
    pub plan: StudyPlan,
    /// Repairs applied to the generated plan, if any.
    #[serde(default)]
    pub plan_repairs: Vec<String>,
    pub days: Vec<DayOutcome>,
    pub references: ReferenceReport,
    /// `None` when review was disabled.
    pub review: Option<BatchReviewSummary>,
    pub fallback_ratio: f64,
    pub published: bool,
    pub study_id: Option<Uuid>,
    /// Why publication was withheld, or what to double-check before use.
    pub publication_note: Option<String>,
}

/// How a run ended, short of failing.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Succeeded(Box<StudyResult>),
    /// Cancellation was observed on entering or while running `phase`.
    Cancelled { phase: WorkflowPhase },
}

/// Run `run_id` to completion.
///
/// # Errors
///
/// [`PipelineError::RunFailed`] after the run has been frozen in `failed`.
/// [`PipelineError::NotFound`] and [`PipelineError::AlreadyFinished`] when
/// there is nothing to run.
pub async fn run_workflow(
    pipeline: &Pipeline,
    run_id: Uuid,
    cancel: &CancellationToken,
) -> Result<RunOutcome, PipelineError> {
    let run = pipeline
        .store
        .get_run(run_id)
        .await?
        .ok_or(PipelineError::NotFound(run_id))?;
    if run.status.is_terminal() {
        return Err(PipelineError::AlreadyFinished {
            run_id,
            status: run.status,
        });
    }
    let request = pipeline
        .store
        .get_request(run.request_id)
        .await?
        .with_context(|| format!("request {} for run {run_id} not found", run.request_id))?;

    let mut driver = RunDriver {
        pipeline,
        run_id,
        request,
        cancel,
        phase: None,
    };
    let failure = match driver.drive().await {
        Ok(outcome) => return Ok(outcome),
        Err(failure) => failure,
    };

    tracing::error!(%run_id, phase = %failure.phase, error = %failure.message, "run failed");
    let update = RunUpdate::Fail {
        failed_phase: failure.phase,
        message: failure.message.clone(),
    };
    match pipeline.store.record_transition(run_id, &update).await {
        Ok(true) => {}
        // Cancelled while the failing phase was running.
        Ok(false) => return Ok(RunOutcome::Cancelled { phase: failure.phase }),
        Err(e) => tracing::error!(%run_id, error = %e, "could not record run failure"),
    }
    Err(PipelineError::RunFailed {
        phase: failure.phase,
        message: failure.message,
    })
}

struct PhaseFailure {
    phase: WorkflowPhase,
    message: String,
}

struct RunDriver<'a> {
    pipeline: &'a Pipeline,
    run_id: Uuid,
    request: GenerationRequest,
    cancel: &'a CancellationToken,
    /// Last phase successfully entered.
    phase: Option<WorkflowPhase>,
}

impl RunDriver<'_> {
    async fn drive(&mut self) -> Result<RunOutcome, PhaseFailure> {
        // ---- parse_request ----
        if !self.enter(WorkflowPhase::ParseRequest, None).await? {
            return self.stop().await;
        }
        let pacing = prompt::book_pacing(&self.request);
        tracing::info!(
            run_id = %self.run_id,
            style = %self.request.style,
            days = self.request.duration_days,
            book = pacing.as_ref().map(|p| p.book.as_str()),
            "request parsed"
        );

        // ---- plan_study ----
        if !self.enter(WorkflowPhase::PlanStudy, None).await? {
            return self.stop().await;
        }
        let generated = self
            .pipeline
            .generator
            .plan(&self.request)
            .await
            .map_err(|e| self.fail(format!("planning failed: {e}")))?;
        let requested = u32::try_from(self.request.duration_days).unwrap_or(1);
        let (plan, plan_repairs) =
            repair::repair_plan(generated, requested, pacing.as_ref()).map_err(|e| self.fail(e))?;
        if !plan_repairs.is_empty() {
            tracing::warn!(run_id = %self.run_id, repairs = ?plan_repairs, "study plan repaired");
        }
        self.checkpoint(ArtifactKind::Plan, &plan).await?;

        // ---- generate_content ----
        if !self.enter(WorkflowPhase::GenerateContent, None).await? {
            return self.stop().await;
        }
        let days = self
            .pipeline
            .generator
            .generate_all(&self.request, &plan, self.cancel)
            .await;
        self.checkpoint(ArtifactKind::Days, &days).await?;

        // ---- validate_references ----
        if !self.enter(WorkflowPhase::ValidateReferences, None).await? {
            return self.stop().await;
        }
        let references = collect_references(&plan, &days);
        let report = ReferenceReport::from_checks(self.pipeline.validator.validate_batch(&references).await);
        tracing::info!(
            run_id = %self.run_id,
            valid = report.valid,
            invalid = report.invalid,
            unavailable = report.unavailable,
            stale = report.stale_served,
            "references validated"
        );
        self.checkpoint(ArtifactKind::References, &report).await?;

        // ---- review_quality ----
        let review_enabled = self.pipeline.config.review_enabled;
        let note = (!review_enabled).then(|| "skipped".to_string());
        if !self.enter(WorkflowPhase::ReviewQuality, note).await? {
            return self.stop().await;
        }
        let review = if review_enabled {
            let Some(summary) = self
                .pipeline
                .reviewer
                .review_batch(&self.request, &plan, &days, self.cancel)
                .await
            else {
                return self.stop().await;
            };
            self.checkpoint(ArtifactKind::Review, &summary).await?;
            Some(summary)
        } else {
            None
        };

        // ---- finalize ----
        if !self.enter(WorkflowPhase::Finalize, None).await? {
            return self.stop().await;
        }
        let result = self.finalize(plan, plan_repairs, days, report, review).await?;
        self.checkpoint(ArtifactKind::Result, &result).await?;

        if !self.enter(WorkflowPhase::Completed, None).await? {
            return self.stop().await;
        }
        tracing::info!(
            run_id = %self.run_id,
            published = result.published,
            fallback_ratio = result.fallback_ratio,
            "run completed"
        );
        Ok(RunOutcome::Succeeded(Box::new(result)))
    }

    /// Persist entry into `phase`. Returns `false` when the run should stop
    /// because it was cancelled.
    async fn enter(&mut self, phase: WorkflowPhase, message: Option<String>) -> Result<bool, PhaseFailure> {
        if let Some(current) = self.phase {
            if !RunStateMachine::is_valid_transition(current, phase) {
                return Err(self.fail(format!("invalid phase transition {current} -> {phase}")));
            }
        }
        if self.cancel.is_cancelled() {
            return Ok(false);
        }

        let status = if phase == WorkflowPhase::Completed {
            RunStatus::Succeeded
        } else {
            RunStatus::Running
        };
        let progress = RunStateMachine::checkpoint(phase).unwrap_or(0);
        let update = RunUpdate::Advance {
            phase,
            status,
            progress,
            message,
        };
        let applied = self
            .pipeline
            .store
            .record_transition(self.run_id, &update)
            .await
            .map_err(|e| self.store_failure(e))?;
        if !applied {
            return Ok(false);
        }
        self.phase = Some(phase);
        tracing::info!(run_id = %self.run_id, %phase, progress, "phase entered");
        Ok(true)
    }

    /// Make sure the run is recorded as cancelled and report it.
    async fn stop(&self) -> Result<RunOutcome, PhaseFailure> {
        let marked = self
            .pipeline
            .store
            .cancel_run(self.run_id)
            .await
            .map_err(|e| self.store_failure(e))?;
        let phase = self.current();
        tracing::info!(run_id = %self.run_id, %phase, marked, "run cancelled");
        Ok(RunOutcome::Cancelled { phase })
    }

    async fn checkpoint<T: Serialize>(&self, kind: ArtifactKind, value: &T) -> Result<(), PhaseFailure> {
        let payload =
            serde_json::to_value(value).map_err(|e| self.fail(format!("could not serialize {kind} artifact: {e}")))?;
        self.pipeline
            .store
            .save_artifact(self.run_id, kind, &payload)
            .await
            .map_err(|e| self.store_failure(e))
    }

    async fn finalize(
        &self,
        plan: StudyPlan,
        plan_repairs: Vec<String>,
        days: Vec<DayOutcome>,
        references: ReferenceReport,
        review: Option<BatchReviewSummary>,
    ) -> Result<StudyResult, PhaseFailure> {
        let mut result = StudyResult {
            run_id: self.run_id,
            fallback_ratio: study::fallback_ratio(&days),
            plan,
            plan_repairs,
            days,
            references,
            review,
            published: false,
            study_id: None,
            publication_note: None,
        };

        if let Some(reason) = publication_blocker(&result, &self.pipeline.config) {
            tracing::warn!(run_id = %self.run_id, %reason, "publication withheld");
            result.publication_note = Some(format!("not published: {reason}"));
            return Ok(result);
        }

        let study = published_study(&self.request, &result)
            .map_err(|e| self.fail(format!("could not assemble study: {e}")))?;
        let study_id = self
            .pipeline
            .publisher
            .publish(&study)
            .await
            .map_err(|e| self.fail(format!("publication failed: {e:#}")))?;
        tracing::info!(run_id = %self.run_id, %study_id, "study published");

        result.published = true;
        result.study_id = Some(study_id);
        if result.references.invalid > 0 {
            result.publication_note = Some(format!(
                "published with {} unverified reference(s)",
                result.references.invalid
            ));
        }
        Ok(result)
    }

    fn current(&self) -> WorkflowPhase {
        self.phase.unwrap_or(WorkflowPhase::ParseRequest)
    }

    fn fail(&self, message: impl fmt::Display) -> PhaseFailure {
        PhaseFailure {
            phase: self.current(),
            message: message.to_string(),
        }
    }

    fn store_failure(&self, error: anyhow::Error) -> PhaseFailure {
        self.fail(format!("storage error: {error:#}"))
    }
}

/// Distinct references cited anywhere in the study: passage references in
/// day order, then outline focus references. Duplicates are detected on
/// the normalized form; the first spelling wins.
pub fn collect_references(plan: &StudyPlan, days: &[DayOutcome]) -> Vec<String> {
    let focus = plan.days.iter().filter_map(|d| d.focus_reference.as_deref());
    let mut seen = HashSet::new();
    let mut references = Vec::new();
    for reference in days.iter().flat_map(|d| d.content().references()).chain(focus) {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = citation::normalize_reference(trimmed).unwrap_or_else(|| trimmed.to_lowercase());
        if seen.insert(key) {
            references.push(trimmed.to_string());
        }
    }
    references
}

/// Why `result` must not be published, if anything.
fn publication_blocker(result: &StudyResult, config: &PipelineConfig) -> Option<String> {
    if result.fallback_ratio > config.max_fallback_ratio {
        let fallbacks = result.days.iter().filter(|d| d.is_fallback()).count();
        return Some(format!(
            "{fallbacks} of {} days use fallback content ({:.0}%, limit {:.0}%)",
            result.days.len(),
            result.fallback_ratio * 100.0,
            config.max_fallback_ratio * 100.0
        ));
    }
    match &result.review {
        Some(review) if review.recommendation == Recommendation::Reject => {
            Some("quality review recommended rejection".to_string())
        }
        _ => None,
    }
}

fn published_study(request: &GenerationRequest, result: &StudyResult) -> serde_json::Result<PublishedStudy> {
    let days = result
        .days
        .iter()
        .map(|day| {
            Ok(PublishedDay {
                day_number: day.day_number() as i32,
                title: day.content().title.clone(),
                is_fallback: day.is_fallback(),
                content: serde_json::to_value(day.content())?,
            })
        })
        .collect::<serde_json::Result<Vec<_>>>()?;

    let unverified: Vec<&str> = result.references.invalid_references().collect();
    let metadata = json!({
        "brief": request.brief,
        "difficulty": request.difficulty,
        "audience": request.audience,
        "special_instructions": request.special_instructions,
        "fallback_ratio": result.fallback_ratio,
        "review_recommendation": result.review.as_ref().map(|r| r.recommendation),
        "unverified_references": unverified,
    });

    Ok(PublishedStudy {
        run_id: result.run_id,
        owner_id: request.owner_id.clone(),
        title: result.plan.title.clone(),
        theme: result.plan.theme.clone(),
        description: result.plan.description.clone(),
        style: request.style,
        duration_days: days.len() as i32,
        metadata,
        days,
    })
}
