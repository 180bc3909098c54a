//! Prompt construction for the planning, content and review calls.
//!
//! Every function here is pure: the same request and plan always produce the
//! same text. Style-specific wording comes from [`styles`]; book studies add
//! a chapter schedule from [`pacing`].

pub mod pacing;
pub mod styles;

use lectio_db::models::{ContentStyle, GenerationRequest};

use crate::study::{DailyContent, DayOutline, StudyPlan};

use self::pacing::Pacing;

/// System prompt shared by every generation call.
pub const SYSTEM_PROMPT: &str = "You are an experienced Bible teacher and curriculum writer. \
You write faithful, accessible study material grounded in scripture. \
Respond with a single JSON object and nothing else: no Markdown fences, no comments, no commentary.";

// ---------------------------------------------------------------------------
// Schema references
// ---------------------------------------------------------------------------

const PLAN_SCHEMA: &str = r#"{
  "title": "string",
  "theme": "string",
  "description": "string, 2-3 sentences",
  "days": [
    {
      "day_number": 1,
      "title": "string",
      "theme": "string",
      "focus_reference": "Book Chapter:Verse-Verse",
      "learning_objective": "string",
      "key_points": ["string"]
    }
  ]
}"#;

const CONTENT_SCHEMA: &str = r#"{
  "day_number": 1,
  "title": "string",
  "scripture_passages": [
    { "reference": "Book Chapter:Verse-Verse", "verses": ["verse text", "..."] }
  ],
  "teaching": "string, several paragraphs",
  "discussion_questions": ["string"],
  "reflection_prompt": "string",
  "application_points": ["string"],
  "closing_focus": "string"
}"#;

const REVIEW_SCHEMA: &str = r#"{
  "approved": true,
  "quality_tier": "excellent | good | acceptable | needs_revision | rejected",
  "concerns": ["string"],
  "strengths": ["string"]
}"#;

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// Chapter schedule for a book study whose book can be identified from the
/// title or brief. `None` for other styles and unknown books.
pub fn book_pacing(request: &GenerationRequest) -> Option<Pacing> {
    if request.style != ContentStyle::BookStudy {
        return None;
    }
    let book = pacing::find_book(&request.title).or_else(|| pacing::find_book(&request.brief))?;
    let days = u32::try_from(request.duration_days).ok()?;
    Some(pacing::plan_coverage(book, days))
}

/// Prompt for the single planning call.
pub fn planning_prompt(request: &GenerationRequest) -> String {
    let style = styles::template_for(request.style);
    let mut prompt = String::with_capacity(2048);

    prompt.push_str(&format!(
        "Plan a {}-day {} titled \"{}\".\n\n",
        request.duration_days, style.label, request.title
    ));
    push_request_context(&mut prompt, request);

    prompt.push_str("## Voice\n\n");
    prompt.push_str(style.voice);
    prompt.push_str("\n\n## Structure\n\n");
    prompt.push_str(style.planning);
    prompt.push_str("\n\n");

    match book_pacing(request) {
        Some(pacing) => {
            prompt.push_str("## Chapter pacing\n\n");
            prompt.push_str(&pacing.instructions());
            prompt.push('\n');
        }
        None if request.style == ContentStyle::BookStudy => {
            prompt.push_str(
                "## Chapter pacing\n\nThe book could not be identified from the title. \
                 Choose a book that fits the brief and pace it thematically across the days.\n\n",
            );
        }
        None => {}
    }

    prompt.push_str(&format!(
        "## Output\n\nReturn exactly {n} entries in \"days\", numbered 1 through {n} with no gaps. \
         Use this JSON shape:\n\n{PLAN_SCHEMA}\n",
        n = request.duration_days
    ));
    prompt
}

/// Prompt for one day's content.
pub fn content_prompt(request: &GenerationRequest, plan: &StudyPlan, outline: &DayOutline) -> String {
    let style = styles::template_for(request.style);
    let mut prompt = String::with_capacity(3072);

    prompt.push_str(&format!(
        "Write day {} of {} of the {} \"{}\".\n\n",
        outline.day_number,
        plan.days.len(),
        style.label,
        plan.title
    ));
    if let Some(theme) = &plan.theme {
        prompt.push_str(&format!("Study theme: {theme}\n"));
    }
    if let Some(description) = &plan.description {
        prompt.push_str(&format!("Study description: {description}\n"));
    }
    prompt.push_str(&format!(
        "Audience: {}\nDifficulty: {}\n\n",
        request.audience, request.difficulty
    ));

    prompt.push_str("## Today's outline\n\n");
    prompt.push_str(&format!("- Title: {}\n", outline.title));
    if let Some(theme) = &outline.theme {
        prompt.push_str(&format!("- Theme: {theme}\n"));
    }
    if let Some(reference) = &outline.focus_reference {
        prompt.push_str(&format!("- Focus passage: {reference}\n"));
    }
    if let Some(objective) = &outline.learning_objective {
        prompt.push_str(&format!("- Learning objective: {objective}\n"));
    }
    for point in &outline.key_points {
        prompt.push_str(&format!("- Key point: {point}\n"));
    }
    prompt.push('\n');

    let coverage =
        book_pacing(request).and_then(|p| Some((p.day(outline.day_number)?, p.book)));
    if let Some((coverage, book)) = coverage {
        match coverage.reference(&book) {
            Some(reference) => prompt.push_str(&format!(
                "## Coverage\n\nThis day covers {reference} only. Every scripture passage must come from {reference}.\n\n"
            )),
            None => prompt.push_str(&format!(
                "## Coverage\n\nThis is a non-chapter day of the {book} study. Draw passages from across the book.\n\n"
            )),
        }
    }

    if let Some(instructions) = &request.special_instructions {
        prompt.push_str(&format!("## Special instructions\n\n{instructions}\n\n"));
    }

    prompt.push_str("## Approach\n\n");
    prompt.push_str(style.daily);
    prompt.push_str(&format!(
        "\n\n## Output\n\nQuote every verse in full; do not abbreviate with ellipses. \
         Use this JSON shape with \"day_number\": {}:\n\n{CONTENT_SCHEMA}\n",
        outline.day_number
    ));
    prompt
}

/// Prompt for reviewing one generated day.
pub fn review_prompt(request: &GenerationRequest, plan: &StudyPlan, day: &DailyContent) -> String {
    let mut prompt = String::with_capacity(4096);
    prompt.push_str(&format!(
        "Review day {} of the study \"{}\" for a {} audience ({}).\n\n",
        day.day_number, plan.title, request.audience, request.difficulty
    ));
    prompt.push_str(
        "## Rubric\n\n\
         - Scriptural accuracy: passages are quoted and cited correctly.\n\
         - Theological soundness: teaching stays within historic orthodox interpretation.\n\
         - Faithfulness to the passage: claims are supported by the text in context.\n\
         - Usefulness: questions and application points fit the audience and difficulty.\n\n\
         Approve only days rated acceptable or better.\n\n",
    );
    prompt.push_str("## Day content\n\n");
    match serde_json::to_string_pretty(day) {
        Ok(json) => prompt.push_str(&json),
        Err(_) => prompt.push_str(&day.teaching),
    }
    prompt.push_str(&format!("\n\n## Output\n\nUse this JSON shape:\n\n{REVIEW_SCHEMA}\n"));
    prompt
}

fn push_request_context(prompt: &mut String, request: &GenerationRequest) {
    prompt.push_str("## Request\n\n");
    prompt.push_str(&format!("- Brief: {}\n", request.brief));
    prompt.push_str(&format!("- Audience: {}\n", request.audience));
    prompt.push_str(&format!("- Difficulty: {}\n", request.difficulty));
    if let Some(instructions) = &request.special_instructions {
        prompt.push_str(&format!("- Special instructions: {instructions}\n"));
    }
    prompt.push('\n');
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use lectio_db::models::Difficulty;
    use uuid::Uuid;

    use super::*;
    use crate::study::ScripturePassage;

    fn request(style: ContentStyle, title: &str, days: i32) -> GenerationRequest {
        GenerationRequest {
            id: Uuid::new_v4(),
            owner_id: "owner".to_string(),
            brief: "Grow in faith".to_string(),
            title: title.to_string(),
            duration_days: days,
            style,
            difficulty: Difficulty::Beginner,
            audience: "youth".to_string(),
            special_instructions: Some("Keep it short".to_string()),
            created_at: Utc::now(),
        }
    }

    fn plan() -> StudyPlan {
        StudyPlan {
            title: "Acts".to_string(),
            theme: Some("The early church".to_string()),
            description: None,
            days: vec![outline(1)],
        }
    }

    fn outline(day: u32) -> DayOutline {
        DayOutline {
            day_number: day,
            title: "Waiting for the Spirit".to_string(),
            theme: None,
            focus_reference: Some("Acts 1:1-11".to_string()),
            learning_objective: Some("Understand the ascension".to_string()),
            key_points: vec!["Promise".to_string()],
        }
    }

    #[test]
    fn planning_prompt_is_deterministic() {
        let req = request(ContentStyle::Topical, "Hope", 7);
        assert_eq!(planning_prompt(&req), planning_prompt(&req));
    }

    #[test]
    fn planning_prompt_carries_request_details() {
        let prompt = planning_prompt(&request(ContentStyle::Relationship, "Together", 5));
        assert!(prompt.contains("5-day relationship-focused study"));
        assert!(prompt.contains("numbered 1 through 5"));
        assert!(prompt.contains("Keep it short"));
        assert!(prompt.contains("youth"));
        assert!(!prompt.contains("Chapter pacing"));
    }

    #[test]
    fn one_day_book_study_instructs_chapter_one_only() {
        let prompt = planning_prompt(&request(ContentStyle::BookStudy, "The Book of Acts", 1));
        assert!(prompt.contains("Cover chapter 1 only"));
        assert!(prompt.contains("Day 1: Acts chapter 1 only"));
    }

    #[test]
    fn unknown_book_falls_back_to_thematic_pacing() {
        let prompt = planning_prompt(&request(ContentStyle::BookStudy, "Letters of Hope", 3));
        assert!(prompt.contains("could not be identified"));
    }

    #[test]
    fn content_prompt_restricts_book_study_coverage() {
        let req = request(ContentStyle::BookStudy, "Acts", 1);
        let prompt = content_prompt(&req, &plan(), &outline(1));
        assert!(prompt.contains("This day covers Acts 1 only"));
        assert!(prompt.contains("Focus passage: Acts 1:1-11"));
        assert!(prompt.contains("\"day_number\": 1"));
    }

    #[test]
    fn styles_change_the_prompt() {
        let devotional = planning_prompt(&request(ContentStyle::Devotional, "Rest", 3));
        let topical = planning_prompt(&request(ContentStyle::Topical, "Rest", 3));
        assert_ne!(devotional, topical);
    }

    #[test]
    fn review_prompt_embeds_day_json() {
        let day = DailyContent {
            day_number: 1,
            title: "Waiting".to_string(),
            scripture_passages: vec![ScripturePassage {
                reference: "Acts 1:4".to_string(),
                verses: vec!["wait for the promise".to_string()],
            }],
            teaching: "Waiting is active.".to_string(),
            discussion_questions: vec![],
            reflection_prompt: None,
            application_points: vec![],
            closing_focus: None,
        };
        let prompt = review_prompt(&request(ContentStyle::Devotional, "Acts", 1), &plan(), &day);
        assert!(prompt.contains("Waiting is active."));
        assert!(prompt.contains("quality_tier"));
    }
}
