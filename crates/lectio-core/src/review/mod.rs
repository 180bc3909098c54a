//! Second-pass quality review of generated days.
//!
//! Days are reviewed one at a time, never concurrently with each other. A
//! review call that fails does not fail the batch: the day is scored
//! `needs_revision` with a concern saying the automated review was
//! unavailable.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use lectio_db::models::GenerationRequest;

use crate::config::PipelineConfig;
use crate::generator::complete_within;
use crate::interpret::{self, Schema, SchemaViolation};
use crate::llm::{CompletionRequest, TextGenerator};
use crate::prompt;
use crate::study::{DailyContent, DayOutcome, StudyPlan};

/// Most frequent concerns kept in a batch summary.
pub const TOP_CONCERNS: usize = 10;

/// Quality tier, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Excellent,
    Good,
    Acceptable,
    #[serde(alias = "needs-revision", alias = "needsRevision")]
    NeedsRevision,
    Rejected,
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Acceptable => "acceptable",
            Self::NeedsRevision => "needs_revision",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Verdict on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub approved: bool,
    #[serde(alias = "qualityTier", alias = "tier")]
    pub quality_tier: QualityTier,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub strengths: Vec<String>,
}

impl Schema for ReviewResult {
    const NAME: &'static str = "review_result";

    fn validate(&self) -> Result<(), SchemaViolation> {
        if self.approved && self.quality_tier == QualityTier::Rejected {
            return Err(SchemaViolation::new("approved", "a rejected day cannot be approved"));
        }
        Ok(())
    }
}

impl ReviewResult {
    fn unreviewed(concern: String) -> Self {
        Self {
            approved: false,
            quality_tier: QualityTier::NeedsRevision,
            concerns: vec![concern],
            strengths: Vec::new(),
        }
    }
}

/// Batch-level decision derived from the individual reviews.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// Every day was approved.
    Publish,
    /// Some days need work but none was rejected.
    Revise,
    /// A day was rejected or most days were not approved.
    Reject,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Publish => "publish",
            Self::Revise => "revise",
            Self::Reject => "reject",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayReview {
    pub day_number: u32,
    pub review: ReviewResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReviewSummary {
    pub reviews: Vec<DayReview>,
    pub tier_counts: BTreeMap<QualityTier, usize>,
    pub approved: usize,
    /// True only when every day was approved.
    pub ready_for_publication: bool,
    /// De-duplicated concerns, most frequent first.
    pub top_concerns: Vec<String>,
    pub recommendation: Recommendation,
}

/// Aggregate per-day reviews.
pub fn summarize(reviews: Vec<DayReview>) -> BatchReviewSummary {
    let mut tier_counts = BTreeMap::new();
    for review in &reviews {
        *tier_counts.entry(review.review.quality_tier).or_insert(0) += 1;
    }
    let approved = reviews.iter().filter(|r| r.review.approved).count();
    let ready_for_publication = !reviews.is_empty() && approved == reviews.len();

    let not_approved = reviews.len() - approved;
    let recommendation = if ready_for_publication {
        Recommendation::Publish
    } else if tier_counts.contains_key(&QualityTier::Rejected) || not_approved * 2 > reviews.len() {
        Recommendation::Reject
    } else {
        Recommendation::Revise
    };

    BatchReviewSummary {
        top_concerns: rank_concerns(&reviews),
        reviews,
        tier_counts,
        approved,
        ready_for_publication,
        recommendation,
    }
}

/// Concerns ranked by frequency, ties broken by first appearance.
fn rank_concerns(reviews: &[DayReview]) -> Vec<String> {
    let mut seen: HashMap<String, (usize, usize)> = HashMap::new();
    let mut originals: Vec<String> = Vec::new();
    for concern in reviews.iter().flat_map(|r| r.review.concerns.iter()) {
        let trimmed = concern.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        let next_index = originals.len();
        let entry = seen.entry(key).or_insert_with(|| (0, next_index));
        if entry.1 == next_index {
            originals.push(trimmed.to_string());
        }
        entry.0 += 1;
    }

    let mut ranked: Vec<(usize, usize)> = seen.into_values().collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    ranked
        .into_iter()
        .take(TOP_CONCERNS)
        .map(|(_, index)| originals[index].clone())
        .collect()
}

/// Scores days with the text generator against a fixed rubric.
pub struct Reviewer {
    llm: Arc<dyn TextGenerator>,
    config: PipelineConfig,
}

impl Reviewer {
    pub fn new(llm: Arc<dyn TextGenerator>, config: PipelineConfig) -> Self {
        Self { llm, config }
    }

    /// Review one day. Never fails.
    pub async fn review(&self, request: &GenerationRequest, plan: &StudyPlan, day: &DailyContent) -> ReviewResult {
        let completion = CompletionRequest {
            system: Some(prompt::SYSTEM_PROMPT.to_string()),
            prompt: prompt::review_prompt(request, plan, day),
            max_tokens: self.config.review.max_tokens,
            temperature: self.config.review.temperature,
        };
        let raw = match complete_within(self.llm.as_ref(), &completion, self.config.review.timeout).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(day = day.day_number, error = %e, "review call failed");
                return ReviewResult::unreviewed(format!("automated review unavailable: {e}"));
            }
        };
        match interpret::extract::<ReviewResult>(&raw) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(day = day.day_number, error = %e, "review response unusable");
                ReviewResult::unreviewed("automated review unavailable: unparsable response".to_string())
            }
        }
    }

    /// Review every day in order and summarize. Fallback days are not sent
    /// to the generator; they are scored `needs_revision` directly.
    ///
    /// Returns `None` if cancelled part-way.
    pub async fn review_batch(
        &self,
        request: &GenerationRequest,
        plan: &StudyPlan,
        days: &[DayOutcome],
        cancel: &CancellationToken,
    ) -> Option<BatchReviewSummary> {
        let mut reviews = Vec::with_capacity(days.len());
        for day in days {
            if cancel.is_cancelled() {
                return None;
            }
            let review = match day.fallback_reason() {
                Some(reason) => ReviewResult::unreviewed(format!("fallback content ({reason})")),
                None => self.review(request, plan, day.content()).await,
            };
            tracing::debug!(day = day.day_number(), tier = %review.quality_tier, approved = review.approved, "day reviewed");
            reviews.push(DayReview {
                day_number: day.day_number(),
                review,
            });
        }
        let summary = summarize(reviews);
        tracing::info!(
            approved = summary.approved,
            days = summary.reviews.len(),
            recommendation = %summary.recommendation,
            "review finished"
        );
        Some(summary)
    }
}
