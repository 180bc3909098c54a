use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Content style of a study. Each style has its own prompt template variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContentStyle {
    /// Reflective, devotional daily readings.
    Devotional,
    /// Thematic / topical study across passages.
    Topical,
    /// Sequential exposition of a single book.
    BookStudy,
    /// Relationship-focused study (couples, families, friendships).
    Relationship,
}

impl fmt::Display for ContentStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Devotional => "devotional",
            Self::Topical => "topical",
            Self::BookStudy => "book_study",
            Self::Relationship => "relationship",
        };
        f.write_str(s)
    }
}

impl FromStr for ContentStyle {
    type Err = ContentStyleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "devotional" => Ok(Self::Devotional),
            "topical" => Ok(Self::Topical),
            "book_study" => Ok(Self::BookStudy),
            "relationship" => Ok(Self::Relationship),
            other => Err(ContentStyleParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ContentStyle`] string.
#[derive(Debug, Clone)]
pub struct ContentStyleParseError(pub String);

impl fmt::Display for ContentStyleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid content style: {:?}", self.0)
    }
}

impl std::error::Error for ContentStyleParseError {}

// ---------------------------------------------------------------------------

/// Difficulty tier of a study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        };
        f.write_str(s)
    }
}

impl FromStr for Difficulty {
    type Err = DifficultyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beginner" => Ok(Self::Beginner),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(DifficultyParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Difficulty`] string.
#[derive(Debug, Clone)]
pub struct DifficultyParseError(pub String);

impl fmt::Display for DifficultyParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid difficulty: {:?}", self.0)
    }
}

impl std::error::Error for DifficultyParseError {}

// ---------------------------------------------------------------------------

/// Status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Terminal statuses never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for RunStatus {
    type Err = RunStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(RunStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`RunStatus`] string.
#[derive(Debug, Clone)]
pub struct RunStatusParseError(pub String);

impl fmt::Display for RunStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid run status: {:?}", self.0)
    }
}

impl std::error::Error for RunStatusParseError {}

// ---------------------------------------------------------------------------

/// Phase of the workflow state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    ParseRequest,
    PlanStudy,
    GenerateContent,
    ValidateReferences,
    ReviewQuality,
    Finalize,
    Completed,
    Failed,
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ParseRequest => "parse_request",
            Self::PlanStudy => "plan_study",
            Self::GenerateContent => "generate_content",
            Self::ValidateReferences => "validate_references",
            Self::ReviewQuality => "review_quality",
            Self::Finalize => "finalize",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for WorkflowPhase {
    type Err = WorkflowPhaseParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parse_request" => Ok(Self::ParseRequest),
            "plan_study" => Ok(Self::PlanStudy),
            "generate_content" => Ok(Self::GenerateContent),
            "validate_references" => Ok(Self::ValidateReferences),
            "review_quality" => Ok(Self::ReviewQuality),
            "finalize" => Ok(Self::Finalize),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(WorkflowPhaseParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`WorkflowPhase`] string.
#[derive(Debug, Clone)]
pub struct WorkflowPhaseParseError(pub String);

impl fmt::Display for WorkflowPhaseParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid workflow phase: {:?}", self.0)
    }
}

impl std::error::Error for WorkflowPhaseParseError {}

// ---------------------------------------------------------------------------

/// Kind of intermediate artifact checkpointed for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Plan,
    Days,
    References,
    Review,
    Result,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Plan => "plan",
            Self::Days => "days",
            Self::References => "references",
            Self::Review => "review",
            Self::Result => "result",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A generation request. Immutable once accepted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GenerationRequest {
    pub id: Uuid,
    pub owner_id: String,
    pub brief: String,
    pub title: String,
    pub duration_days: i32,
    pub style: ContentStyle,
    pub difficulty: Difficulty,
    pub audience: String,
    pub special_instructions: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One execution of the pipeline for a single request.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub request_id: Uuid,
    pub phase: WorkflowPhase,
    pub status: RunStatus,
    pub progress: i32,
    pub error_message: Option<String>,
    /// Phase that was executing when the run entered `failed`.
    pub failed_phase: Option<WorkflowPhase>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit row for a phase transition.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PhaseTransition {
    pub id: i64,
    pub run_id: Uuid,
    pub phase: WorkflowPhase,
    pub status: RunStatus,
    pub progress: i32,
    pub message: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// JSON checkpoint written at a phase boundary.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RunArtifact {
    pub run_id: Uuid,
    pub kind: ArtifactKind,
    pub payload: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Cached result of validating a normalized scripture reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ReferenceValidation {
    pub reference: String,
    pub is_valid: bool,
    pub resolved_text: Option<String>,
    pub upstream_error: Option<String>,
    pub validated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ReferenceValidation {
    /// Whether the entry is still fresh at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// A published study.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Study {
    pub id: Uuid,
    pub run_id: Uuid,
    pub owner_id: String,
    pub title: String,
    pub theme: Option<String>,
    pub description: Option<String>,
    pub duration_days: i32,
    pub style: ContentStyle,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// One day document of a published study.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StudyDay {
    pub study_id: Uuid,
    pub day_number: i32,
    pub title: String,
    pub is_fallback: bool,
    pub content: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_style_roundtrips_through_strings() {
        for style in [
            ContentStyle::Devotional,
            ContentStyle::Topical,
            ContentStyle::BookStudy,
            ContentStyle::Relationship,
        ] {
            assert_eq!(style.to_string().parse::<ContentStyle>().unwrap(), style);
        }
    }

    #[test]
    fn unknown_style_is_rejected() {
        let err = "poetry".parse::<ContentStyle>().unwrap_err();
        assert_eq!(err.to_string(), "invalid content style: \"poetry\"");
    }

    #[test]
    fn run_status_terminality() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }

    #[test]
    fn phase_serializes_snake_case() {
        let json = serde_json::to_string(&WorkflowPhase::ValidateReferences).unwrap();
        assert_eq!(json, "\"validate_references\"");
        assert_eq!(
            "review_quality".parse::<WorkflowPhase>().unwrap(),
            WorkflowPhase::ReviewQuality
        );
    }

    #[test]
    fn reference_freshness_uses_expiry() {
        let now = Utc::now();
        let entry = ReferenceValidation {
            reference: "John 3:16".to_string(),
            is_valid: true,
            resolved_text: Some("For God so loved the world".to_string()),
            upstream_error: None,
            validated_at: now,
            expires_at: now + chrono::Duration::hours(1),
        };
        assert!(entry.is_fresh(now));
        assert!(!entry.is_fresh(now + chrono::Duration::hours(2)));
    }
}
