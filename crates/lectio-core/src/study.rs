//! Pipeline artifacts: the study plan, daily content, and per-day outcomes.
//!
//! Field names accept the camelCase spellings generators commonly emit.

use serde::{Deserialize, Deserializer, Serialize};

use crate::interpret::{Schema, SchemaViolation};

/// Outline of a single day, produced by the planning phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayOutline {
    #[serde(alias = "dayNumber", alias = "day")]
    pub day_number: u32,
    pub title: String,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default, alias = "focusReference", alias = "scripture_focus", alias = "scriptureFocus")]
    pub focus_reference: Option<String>,
    #[serde(default, alias = "learningObjective", alias = "objective")]
    pub learning_objective: Option<String>,
    #[serde(default, alias = "keyPoints")]
    pub key_points: Vec<String>,
}

/// The whole-study plan returned by the planning call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyPlan {
    pub title: String,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(alias = "outlines", alias = "daily_outlines", alias = "dailyOutlines")]
    pub days: Vec<DayOutline>,
}

impl Schema for StudyPlan {
    const NAME: &'static str = "study_plan";

    fn validate(&self) -> Result<(), SchemaViolation> {
        if self.title.trim().is_empty() {
            return Err(SchemaViolation::new("title", "must not be empty"));
        }
        if self.days.is_empty() {
            return Err(SchemaViolation::new("days", "must contain at least one outline"));
        }
        for (i, day) in self.days.iter().enumerate() {
            if day.day_number == 0 {
                return Err(SchemaViolation::new(
                    format!("days[{i}].day_number"),
                    "must be at least 1",
                ));
            }
            if day.title.trim().is_empty() {
                return Err(SchemaViolation::new(format!("days[{i}].title"), "must not be empty"));
            }
        }
        Ok(())
    }
}

/// A scripture passage: a locator plus its verses in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScripturePassage {
    pub reference: String,
    #[serde(default, alias = "text", deserialize_with = "one_or_many")]
    pub verses: Vec<String>,
}

/// Accepts either a single string or a list of strings.
fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(text) => vec![text],
        OneOrMany::Many(list) => list,
    })
}

/// Fully realized content for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyContent {
    /// Filled in from the outline when the generator leaves it out.
    #[serde(default, alias = "dayNumber", alias = "day")]
    pub day_number: u32,
    #[serde(default)]
    pub title: String,
    #[serde(alias = "scripturePassages", alias = "passages", alias = "scripture")]
    pub scripture_passages: Vec<ScripturePassage>,
    #[serde(alias = "teaching_content", alias = "teachingContent", alias = "body")]
    pub teaching: String,
    #[serde(default, alias = "discussionQuestions", alias = "discussion_prompts")]
    pub discussion_questions: Vec<String>,
    #[serde(default, alias = "reflectionPrompt", alias = "reflection_question")]
    pub reflection_prompt: Option<String>,
    #[serde(default, alias = "applicationPoints")]
    pub application_points: Vec<String>,
    #[serde(default, alias = "closingFocus", alias = "prayer_focus", alias = "prayerFocus")]
    pub closing_focus: Option<String>,
}

impl DailyContent {
    /// Names of optional fields the generator left empty.
    pub fn omitted_fields(&self) -> Vec<&'static str> {
        let mut omitted = Vec::new();
        if self.discussion_questions.is_empty() {
            omitted.push("discussion_questions");
        }
        if self.reflection_prompt.as_deref().is_none_or(|s| s.trim().is_empty()) {
            omitted.push("reflection_prompt");
        }
        if self.application_points.is_empty() {
            omitted.push("application_points");
        }
        if self.closing_focus.as_deref().is_none_or(|s| s.trim().is_empty()) {
            omitted.push("closing_focus");
        }
        omitted
    }

    /// Every passage reference in the day, in order.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.scripture_passages.iter().map(|p| p.reference.as_str())
    }
}

impl Schema for DailyContent {
    const NAME: &'static str = "daily_content";

    fn validate(&self) -> Result<(), SchemaViolation> {
        if self.scripture_passages.is_empty() {
            return Err(SchemaViolation::new(
                "scripture_passages",
                "must contain at least one passage",
            ));
        }
        for (i, passage) in self.scripture_passages.iter().enumerate() {
            if passage.reference.trim().is_empty() {
                return Err(SchemaViolation::new(
                    format!("scripture_passages[{i}].reference"),
                    "must not be empty",
                ));
            }
        }
        if self.teaching.trim().is_empty() {
            return Err(SchemaViolation::new("teaching", "must not be empty"));
        }
        Ok(())
    }
}

/// Result of generating one day: genuine content or tagged fallback content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DayOutcome {
    Generated { content: DailyContent },
    Fallback {
        day_number: u32,
        reason: String,
        content: DailyContent,
    },
}

impl DayOutcome {
    pub fn day_number(&self) -> u32 {
        match self {
            Self::Generated { content } => content.day_number,
            Self::Fallback { day_number, .. } => *day_number,
        }
    }

    pub fn content(&self) -> &DailyContent {
        match self {
            Self::Generated { content } | Self::Fallback { content, .. } => content,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match self {
            Self::Generated { .. } => None,
            Self::Fallback { reason, .. } => Some(reason),
        }
    }
}

/// Share of fallback days, in `0.0..=1.0`. Zero for an empty batch.
pub fn fallback_ratio(days: &[DayOutcome]) -> f64 {
    if days.is_empty() {
        return 0.0;
    }
    let fallbacks = days.iter().filter(|d| d.is_fallback()).count();
    fallbacks as f64 / days.len() as f64
}
