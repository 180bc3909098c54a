//! Content generation: one planning call, then one call per day under a
//! bounded worker pool.
//!
//! A day whose call fails (transport error, timeout, unparsable response)
//! is replaced by fallback content synthesized from its outline. The batch
//! itself never fails; results are assembled by day index, not by the order
//! workers finish in.

pub mod fallback;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use lectio_db::models::GenerationRequest;

use crate::config::{CallBudget, PipelineConfig};
use crate::interpret::{self, InterpretError, Schema};
use crate::llm::{CompletionRequest, LlmError, TextGenerator};
use crate::prompt;
use crate::study::{DailyContent, DayOutcome, DayOutline, StudyPlan};

/// Why a single generation call produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Unparsable(#[from] InterpretError),
}

/// Message sent from a day worker back to the collecting loop.
struct DayDone {
    index: usize,
    result: Result<DailyContent, GenerationError>,
}

/// Drives the planning and per-day calls through prompt + interpreter.
#[derive(Clone)]
pub struct ContentGenerator {
    llm: Arc<dyn TextGenerator>,
    config: PipelineConfig,
}

impl ContentGenerator {
    pub fn new(llm: Arc<dyn TextGenerator>, config: PipelineConfig) -> Self {
        Self { llm, config }
    }

    /// Produce the study plan. Failures here are fatal to the run.
    pub async fn plan(&self, request: &GenerationRequest) -> Result<StudyPlan, GenerationError> {
        let prompt = prompt::planning_prompt(request);
        let plan: StudyPlan = self.call(prompt, self.config.planning).await?;
        tracing::info!(
            request_id = %request.id,
            outlines = plan.days.len(),
            requested = request.duration_days,
            "study plan generated"
        );
        Ok(plan)
    }

    /// Generate one day's content.
    pub async fn generate_day(
        &self,
        request: &GenerationRequest,
        plan: &StudyPlan,
        outline: &DayOutline,
    ) -> Result<DailyContent, GenerationError> {
        let prompt = prompt::content_prompt(request, plan, outline);
        let mut content: DailyContent = self.call(prompt, self.config.content).await?;
        content.day_number = outline.day_number;
        if content.title.trim().is_empty() {
            content.title = outline.title.clone();
        }
        Ok(content)
    }

    /// Generate every day of `plan`. Always returns one outcome per outline,
    /// in plan order.
    ///
    /// Cancellation stops dispatching new days; days that were never started
    /// are filled with fallback content tagged `cancelled`.
    pub async fn generate_all(
        &self,
        request: &GenerationRequest,
        plan: &StudyPlan,
        cancel: &CancellationToken,
    ) -> Vec<DayOutcome> {
        let width = self.config.day_concurrency.max(1);
        let request = Arc::new(request.clone());
        let plan = Arc::new(plan.clone());
        let semaphore = Arc::new(Semaphore::new(width));
        let (tx, mut rx) = mpsc::channel::<DayDone>(width * 2);
        let mut slots: Vec<Option<Result<DailyContent, GenerationError>>> =
            (0..plan.days.len()).map(|_| None).collect();
        let mut dispatched = 0;

        for index in 0..plan.days.len() {
            if index > 0 && index % width == 0 && !self.config.batch_pause.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.batch_pause) => {}
                    _ = cancel.cancelled() => {}
                }
            }
            if cancel.is_cancelled() {
                tracing::info!(request_id = %request.id, dispatched, "day generation cancelled");
                break;
            }

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let generator = self.clone();
            let request = Arc::clone(&request);
            let plan = Arc::clone(&plan);
            let tx = tx.clone();
            dispatched += 1;

            tokio::spawn(async move {
                let outline = &plan.days[index];
                let result = generator.generate_day(&request, &plan, outline).await;
                drop(permit);
                let _ = tx.send(DayDone { index, result }).await;
            });
        }
        drop(tx);

        while let Some(done) = rx.recv().await {
            slots[done.index] = Some(done.result);
        }

        let outcomes: Vec<DayOutcome> = plan
            .days
            .iter()
            .zip(slots)
            .enumerate()
            .map(|(index, (outline, slot))| match slot {
                Some(Ok(content)) => self.accept(content),
                Some(Err(error)) => fallback(outline, error.to_string()),
                None if index >= dispatched => fallback(outline, "cancelled".to_string()),
                None => fallback(outline, "generation worker stopped unexpectedly".to_string()),
            })
            .collect();

        let fallbacks = outcomes.iter().filter(|o| o.is_fallback()).count();
        tracing::info!(
            request_id = %request.id,
            days = outcomes.len(),
            fallbacks,
            "day generation finished"
        );
        outcomes
    }

    /// Apply the omission policy to generated content.
    fn accept(&self, content: DailyContent) -> DayOutcome {
        let omitted = content.omitted_fields();
        if omitted.is_empty() {
            return DayOutcome::Generated { content };
        }
        let limit = self.config.max_omitted_optional_fields;
        if let Some(limit) = limit.filter(|limit| omitted.len() > *limit) {
            tracing::warn!(
                day = content.day_number,
                omitted = ?omitted,
                limit,
                "day demoted to fallback: too many omitted fields"
            );
            return DayOutcome::Fallback {
                day_number: content.day_number,
                reason: format!("too many omitted fields: {}", omitted.join(", ")),
                content,
            };
        }
        tracing::warn!(day = content.day_number, omitted = ?omitted, "day omitted optional fields");
        DayOutcome::Generated { content }
    }

    async fn call<T: Schema>(&self, prompt: String, budget: CallBudget) -> Result<T, GenerationError> {
        let request = CompletionRequest {
            system: Some(prompt::SYSTEM_PROMPT.to_string()),
            prompt,
            max_tokens: budget.max_tokens,
            temperature: budget.temperature,
        };
        let raw = complete_within(self.llm.as_ref(), &request, budget.timeout).await?;
        Ok(interpret::extract::<T>(&raw)?)
    }
}

/// Run one completion under a wall-clock budget.
pub async fn complete_within(
    llm: &dyn TextGenerator,
    request: &CompletionRequest,
    timeout: Duration,
) -> Result<String, LlmError> {
    match tokio::time::timeout(timeout, llm.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(timeout)),
    }
}

fn fallback(outline: &DayOutline, reason: String) -> DayOutcome {
    tracing::warn!(day = outline.day_number, %reason, "using fallback content");
    DayOutcome::Fallback {
        day_number: outline.day_number,
        reason,
        content: fallback::fallback_content(outline),
    }
}
