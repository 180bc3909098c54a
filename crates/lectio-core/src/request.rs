//! Request intake: validates a caller-supplied brief before any run exists.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use lectio_db::models::{ContentStyle, Difficulty, GenerationRequest};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_BRIEF_CHARS: usize = 4000;
pub const MAX_INSTRUCTIONS_CHARS: usize = 2000;
pub const MAX_DURATION_DAYS: i32 = 365;

/// Unvalidated request as submitted by the surrounding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGenerationRequest {
    pub owner_id: String,
    pub title: String,
    pub brief: String,
    pub duration_days: i32,
    /// Free-form style name; unknown names fall back to `devotional`.
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub special_instructions: Option<String>,
}

/// Reasons a request is rejected before a run starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} is too long ({len} characters, max {max})")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("duration must be between 1 and 365 days, got {0}")]
    Duration(i32),

    #[error("invalid difficulty {0:?} (expected beginner, intermediate, or advanced)")]
    Difficulty(String),
}

/// Validate and normalize a request, assigning it a fresh id.
pub fn validate_request(
    new: &NewGenerationRequest,
) -> Result<GenerationRequest, RequestValidationError> {
    let owner_id = required("owner_id", &new.owner_id, MAX_TITLE_CHARS)?;
    let title = required("title", &new.title, MAX_TITLE_CHARS)?;
    let brief = required("brief", &new.brief, MAX_BRIEF_CHARS)?;

    if !(1..=MAX_DURATION_DAYS).contains(&new.duration_days) {
        return Err(RequestValidationError::Duration(new.duration_days));
    }

    let style = parse_style(new.style.as_deref());

    let difficulty = match new.difficulty.as_deref().map(str::trim) {
        None | Some("") => Difficulty::Intermediate,
        Some(value) => value
            .to_ascii_lowercase()
            .parse::<Difficulty>()
            .map_err(|_| RequestValidationError::Difficulty(value.to_string()))?,
    };

    let audience = new
        .audience
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or("general")
        .to_string();

    let special_instructions = match new.special_instructions.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(text) => Some(required("special_instructions", text, MAX_INSTRUCTIONS_CHARS)?),
    };

    Ok(GenerationRequest {
        id: Uuid::new_v4(),
        owner_id,
        brief,
        title,
        duration_days: new.duration_days,
        style,
        difficulty,
        audience,
        special_instructions,
        created_at: Utc::now(),
    })
}

/// Map a style name onto the closed style set.
///
/// Accepts a few common synonyms; anything unrecognized becomes
/// [`ContentStyle::Devotional`].
pub fn parse_style(raw: Option<&str>) -> ContentStyle {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return ContentStyle::Devotional;
    };
    let key = raw.to_ascii_lowercase().replace(['-', ' '], "_");
    match key.as_str() {
        "devotional" | "reflective" => ContentStyle::Devotional,
        "topical" | "thematic" => ContentStyle::Topical,
        "book_study" | "book" | "exposition" | "book_exposition" => ContentStyle::BookStudy,
        "relationship" | "relationships" | "relational" => ContentStyle::Relationship,
        _ => {
            tracing::warn!(style = %raw, "unknown content style, using devotional");
            ContentStyle::Devotional
        }
    }
}

fn required(field: &'static str, value: &str, max: usize) -> Result<String, RequestValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RequestValidationError::Empty { field });
    }
    let len = trimmed.chars().count();
    if len > max {
        return Err(RequestValidationError::TooLong { field, len, max });
    }
    Ok(trimmed.to_string())
}
