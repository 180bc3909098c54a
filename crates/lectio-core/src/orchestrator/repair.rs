//! Plan repair: forces a generated plan into exactly `1..=N` days.

use std::collections::HashSet;

use crate::prompt::pacing::{self, Pacing};
use crate::study::{DayOutline, StudyPlan};

/// Repair `plan` so it has exactly `requested` outlines numbered `1..=N`.
///
/// Outlines are sorted by day number, duplicates dropped (first wins),
/// extras truncated, the rest renumbered, and missing days padded with
/// synthesized review-and-application outlines. For book studies each
/// outline's focus reference is pulled inside the day's scheduled
/// chapters.
///
/// Returns a list of the repairs applied, or an error when the plan has no
/// usable outline at all.
pub fn repair_plan(
    mut plan: StudyPlan,
    requested: u32,
    pacing: Option<&Pacing>,
) -> Result<(StudyPlan, Vec<String>), String> {
    let mut repairs = Vec::new();
    let original_len = plan.days.len();

    plan.days.retain(|d| d.day_number > 0 && !d.title.trim().is_empty());
    if plan.days.is_empty() {
        return Err(format!(
            "plan contained no usable days ({original_len} outlines returned)"
        ));
    }

    if !plan.days.is_sorted_by_key(|d| d.day_number) {
        plan.days.sort_by_key(|d| d.day_number);
        repairs.push("sorted outlines by day number".to_string());
    }

    let mut seen = HashSet::new();
    let before = plan.days.len();
    plan.days.retain(|d| seen.insert(d.day_number));
    if plan.days.len() < before {
        repairs.push(format!("dropped {} duplicate outline(s)", before - plan.days.len()));
    }

    let requested_len = requested as usize;
    if plan.days.len() > requested_len {
        repairs.push(format!("truncated {} extra outline(s)", plan.days.len() - requested_len));
        plan.days.truncate(requested_len);
    }

    let mut renumbered = false;
    for (i, outline) in plan.days.iter_mut().enumerate() {
        let expected = i as u32 + 1;
        if outline.day_number != expected {
            outline.day_number = expected;
            renumbered = true;
        }
    }
    if renumbered {
        repairs.push("renumbered outlines to a contiguous sequence".to_string());
    }

    let missing = requested_len.saturating_sub(plan.days.len());
    if missing > 0 {
        let start = plan.days.len() as u32 + 1;
        plan.days
            .extend((start..=requested).map(|day| padding_outline(day, pacing)));
        repairs.push(format!("padded {missing} missing day(s)"));
    }

    if let Some(pacing) = pacing {
        let aligned = align_with_pacing(&mut plan, pacing);
        if aligned > 0 {
            repairs.push(format!("aligned {aligned} focus reference(s) with the chapter schedule"));
        }
    }

    Ok((plan, repairs))
}

fn padding_outline(day: u32, pacing: Option<&Pacing>) -> DayOutline {
    let focus_reference = pacing.and_then(|p| p.day(day)?.reference(&p.book));
    DayOutline {
        day_number: day,
        title: format!("Day {day}: review and application"),
        theme: Some("Review and application".to_string()),
        focus_reference,
        learning_objective: Some("Consolidate what has been studied so far and put it into practice".to_string()),
        key_points: Vec::new(),
    }
}

/// Point each outline's focus reference at its scheduled chapters when it
/// currently falls outside them. Returns how many outlines changed.
fn align_with_pacing(plan: &mut StudyPlan, pacing: &Pacing) -> usize {
    let Some(book) = pacing::books().iter().find(|b| b.name == pacing.book) else {
        return 0;
    };
    let mut changed = 0;
    for outline in &mut plan.days {
        let Some(coverage) = pacing.day(outline.day_number) else {
            continue;
        };
        let Some((first, last)) = coverage.span() else {
            continue;
        };
        let inside = outline
            .focus_reference
            .as_deref()
            .and_then(|r| pacing::chapter_span(r, book))
            .is_some_and(|(a, b)| a >= first && b <= last);
        if !inside {
            outline.focus_reference = coverage.reference(&pacing.book);
            changed += 1;
        }
    }
    changed
}
