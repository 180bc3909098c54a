//! Placeholder content synthesized from a day's outline when generation
//! fails, so a batch never loses a day.

use crate::study::{DailyContent, DayOutline, ScripturePassage};

/// Build fallback content for `outline`.
pub fn fallback_content(outline: &DayOutline) -> DailyContent {
    let theme = outline
        .theme
        .clone()
        .unwrap_or_else(|| outline.title.clone());

    let mut teaching = format!("Today's study, \"{}\", focuses on {}.", outline.title, theme.to_lowercase());
    if let Some(objective) = &outline.learning_objective {
        teaching.push_str(&format!(" The aim is to {}.", objective.trim_end_matches('.').to_lowercase()));
    }
    if let Some(reference) = &outline.focus_reference {
        teaching.push_str(&format!(" Read {reference} slowly, more than once, noting what it reveals."));
    }
    if !outline.key_points.is_empty() {
        teaching.push_str("\n\nConsider these points as you read:");
        for point in &outline.key_points {
            teaching.push_str(&format!("\n- {point}"));
        }
    }

    let mut discussion_questions: Vec<String> = outline
        .key_points
        .iter()
        .take(3)
        .map(|point| format!("What does the passage show you about this: {point}?"))
        .collect();
    if discussion_questions.is_empty() {
        discussion_questions.push(format!("What stands out to you about {}?", theme.to_lowercase()));
    }

    DailyContent {
        day_number: outline.day_number,
        title: outline.title.clone(),
        scripture_passages: outline
            .focus_reference
            .iter()
            .map(|reference| ScripturePassage {
                reference: reference.clone(),
                verses: Vec::new(),
            })
            .collect(),
        teaching,
        discussion_questions,
        reflection_prompt: Some(format!(
            "Where do you see {} at work in your own life this week?",
            theme.to_lowercase()
        )),
        application_points: vec![format!("Spend ten minutes today reflecting on {}.", theme.to_lowercase())],
        closing_focus: Some(format!("Close by asking for understanding of {}.", theme.to_lowercase())),
    }
}
