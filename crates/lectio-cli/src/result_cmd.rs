//! `lectio result` command: print the outcome of a completed run.

use anyhow::Result;
use uuid::Uuid;

use lectio_core::{RunService, StudyResult};

pub async fn run_result(service: &RunService, run_id: Uuid, json: bool) -> Result<()> {
    let result = service.get_result(run_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }
    Ok(())
}

/// Human-readable summary of a run result.
pub fn print_summary(result: &StudyResult) {
    println!("Study: {}", result.plan.title);
    if let Some(theme) = &result.plan.theme {
        println!("Theme: {theme}");
    }
    println!("Run: {}", result.run_id);
    println!();

    println!("Days:");
    for day in &result.days {
        let content = day.content();
        let references: Vec<&str> = content.references().collect();
        match day.fallback_reason() {
            Some(reason) => println!(
                "  [!] Day {}: {} (fallback: {reason})",
                day.day_number(),
                content.title
            ),
            None => println!(
                "  [+] Day {}: {} ({})",
                day.day_number(),
                content.title,
                references.join("; ")
            ),
        }
    }
    println!();

    let refs = &result.references;
    println!(
        "References: {} valid, {} invalid, {} unavailable ({} served from stale cache)",
        refs.valid, refs.invalid, refs.unavailable, refs.stale_served
    );
    for reference in refs.invalid_references() {
        println!("  invalid: {reference}");
    }

    match &result.review {
        Some(review) => {
            println!(
                "Review: {}/{} approved, recommendation {}",
                review.approved,
                review.reviews.len(),
                review.recommendation
            );
            for concern in &review.top_concerns {
                println!("  - {concern}");
            }
        }
        None => println!("Review: skipped"),
    }

    println!("Fallback ratio: {:.0}%", result.fallback_ratio * 100.0);
    match result.study_id {
        Some(id) => println!("Published: yes (study {id})"),
        None => println!("Published: no"),
    }
    if let Some(note) = &result.publication_note {
        println!("Note: {note}");
    }
}
