//! End-to-end pipeline runs against in-memory stores and a scripted
//! text generator.

mod common;

use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use lectio_core::citation::CheckSource;
use lectio_core::orchestrator::RunOutcome;
use lectio_core::review::Recommendation;
use lectio_core::{PipelineConfig, PipelineError, StudyResult};
use lectio_db::models::{RunStatus, WorkflowPhase};

use common::{Harness, ScriptedGenerator, StaticLookup, plan_json, request, test_config};

async fn run_to_completion(harness: &Harness, title: &str, days: i32, style: &str) -> (Uuid, StudyResult) {
    let run_id = harness.service.submit(request(title, days, style)).await.unwrap();
    match harness.service.execute_run(run_id).await.unwrap() {
        RunOutcome::Succeeded(result) => (run_id, *result),
        other => panic!("expected success, got {other:?}"),
    }
}

/// Poll until the run reaches `phase` or any terminal status.
async fn wait_for_phase(harness: &Harness, run_id: Uuid, phase: WorkflowPhase) {
    for _ in 0..200 {
        let snapshot = harness.service.get_run_status(run_id).await.unwrap();
        if snapshot.run.phase == phase || snapshot.run.status.is_terminal() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {run_id} never reached {phase}");
}

async fn wait_for_terminal(harness: &Harness, run_id: Uuid) -> RunStatus {
    for _ in 0..300 {
        let status = harness.service.get_run_status(run_id).await.unwrap().run.status;
        if status.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {run_id} never finished");
}

// ===========================================================================
// Happy paths
// ===========================================================================

#[tokio::test]
async fn seven_day_devotional_study_completes_and_publishes() {
    let harness = Harness::new(ScriptedGenerator::with_days(7));
    let (run_id, result) = run_to_completion(&harness, "Trusting God", 7, "devotional").await;

    let days: Vec<u32> = result.days.iter().map(|d| d.day_number()).collect();
    assert_eq!(days, (1..=7).collect::<Vec<_>>());
    assert!(result.days.iter().all(|d| !d.is_fallback()));
    assert_eq!(result.fallback_ratio, 0.0);

    let review = result.review.as_ref().expect("review enabled by default");
    assert_eq!(review.reviews.len(), 7);
    assert!(review.ready_for_publication);
    assert_eq!(review.recommendation, Recommendation::Publish);

    assert!(result.published);
    assert!(result.publication_note.is_none());
    let published = harness.publisher.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(Some(published[0].0), result.study_id);
    assert_eq!(published[0].1.days.len(), 7);

    let snapshot = harness.service.get_run_status(run_id).await.unwrap();
    assert_eq!(snapshot.run.status, RunStatus::Succeeded);
    assert_eq!(snapshot.run.phase, WorkflowPhase::Completed);
    assert_eq!(snapshot.run.progress, 100);

    let fetched = harness.service.get_result(run_id).await.unwrap();
    assert_eq!(fetched, result);
}

#[tokio::test]
async fn phase_history_is_ordered_and_progress_never_decreases() {
    let harness = Harness::new(ScriptedGenerator::with_days(3));
    let (run_id, _) = run_to_completion(&harness, "Trusting God", 3, "devotional").await;

    let history = harness.service.get_run_status(run_id).await.unwrap().history;
    let phases: Vec<WorkflowPhase> = history.iter().map(|h| h.phase).collect();
    assert_eq!(
        phases,
        vec![
            WorkflowPhase::ParseRequest,
            WorkflowPhase::ParseRequest,
            WorkflowPhase::PlanStudy,
            WorkflowPhase::GenerateContent,
            WorkflowPhase::ValidateReferences,
            WorkflowPhase::ReviewQuality,
            WorkflowPhase::Finalize,
            WorkflowPhase::Completed,
        ]
    );
    assert!(history.windows(2).all(|w| w[0].progress <= w[1].progress));
    assert_eq!(history.last().unwrap().progress, 100);
}

#[tokio::test]
async fn single_day_book_study_stays_in_chapter_one() {
    let plan = plan_json(1, |_| "Acts 2:1-13".to_string());
    let harness = Harness::new(ScriptedGenerator::with_plan(plan));
    let (_, result) = run_to_completion(&harness, "Acts", 1, "book_study").await;

    assert_eq!(result.plan.days.len(), 1);
    assert_eq!(result.plan.days[0].focus_reference.as_deref(), Some("Acts 1"));
    assert!(!result.plan_repairs.is_empty());

    let planning = harness.llm.prompts().into_iter().find(|p| p.starts_with("Plan a ")).unwrap();
    assert!(planning.contains("Cover chapter 1 only"));

    let content_prompt = harness.llm.content_prompt(1).unwrap();
    assert!(content_prompt.contains("This day covers Acts 1 only"));

    let passages = &result.days[0].content().scripture_passages;
    assert!(passages.iter().all(|p| p.reference.starts_with("Acts 1")));
}

#[tokio::test]
async fn noisy_responses_are_repaired_without_fallbacks() {
    let harness = Harness::new(ScriptedGenerator::with_days(4).noisy());
    let (_, result) = run_to_completion(&harness, "Trusting God", 4, "devotional").await;
    assert!(result.days.iter().all(|d| !d.is_fallback()));
    assert_eq!(result.days[2].content().closing_focus.as_deref(), Some("Close in prayer."));
}

#[tokio::test]
async fn oversized_plan_is_truncated_to_requested_days() {
    let harness = Harness::new(ScriptedGenerator::with_days(5));
    let (_, result) = run_to_completion(&harness, "Trusting God", 3, "topical").await;
    assert_eq!(result.plan.days.len(), 3);
    assert_eq!(result.days.len(), 3);
    assert_eq!(harness.llm.count("Write day "), 3);
}

// ===========================================================================
// Partial failure
// ===========================================================================

#[tokio::test]
async fn timed_out_day_becomes_fallback_and_blocks_publication() {
    let harness = Harness::new(ScriptedGenerator::with_days(3).stall_days(&[2]));
    let (_, result) = run_to_completion(&harness, "Trusting God", 3, "topical").await;

    assert_eq!(result.days.len(), 3);
    assert!(!result.days[0].is_fallback());
    assert!(result.days[1].is_fallback());
    assert!(result.days[1].fallback_reason().unwrap().contains("timed out"));
    assert!(!result.days[2].is_fallback());

    assert!((result.fallback_ratio - 1.0 / 3.0).abs() < 1e-9);
    assert!(!result.published);
    assert!(result.publication_note.as_deref().unwrap().contains("fallback"));
    assert!(harness.publisher.published().await.is_empty());
}

#[tokio::test]
async fn k_of_n_failures_keep_day_order() {
    let harness = Harness::new(ScriptedGenerator::with_days(10).fail_days(&[3, 7]));
    let (_, result) = run_to_completion(&harness, "Trusting God", 10, "topical").await;

    let days: Vec<u32> = result.days.iter().map(|d| d.day_number()).collect();
    assert_eq!(days, (1..=10).collect::<Vec<_>>());
    let fallbacks: Vec<u32> = result
        .days
        .iter()
        .filter(|d| d.is_fallback())
        .map(|d| d.day_number())
        .collect();
    assert_eq!(fallbacks, vec![3, 7]);
    assert!((result.fallback_ratio - 0.2).abs() < 1e-9);

    // Fallback days are scored without a review call.
    assert_eq!(harness.llm.count("Review day "), 8);
    assert!(result.published);
}

#[tokio::test]
async fn day_generation_respects_the_worker_pool_width() {
    let llm = ScriptedGenerator::with_days(9).content_delay(Duration::from_millis(20));
    let harness = Harness::new(llm);
    run_to_completion(&harness, "Trusting God", 9, "topical").await;
    let width = PipelineConfig::default().day_concurrency;
    assert!(harness.llm.max_in_flight() <= width);
    assert!(harness.llm.max_in_flight() >= 1);
}

#[tokio::test]
async fn rejected_review_withholds_publication() {
    let llm = ScriptedGenerator::with_days(2).review_with(json!({
        "approved": false,
        "quality_tier": "rejected",
        "concerns": ["Misquotes the passage"],
    }));
    let harness = Harness::new(llm);
    let (_, result) = run_to_completion(&harness, "Trusting God", 2, "topical").await;

    let review = result.review.unwrap();
    assert_eq!(review.recommendation, Recommendation::Reject);
    assert_eq!(review.top_concerns, vec!["Misquotes the passage"]);
    assert!(!result.published);
    assert!(result.publication_note.unwrap().contains("rejection"));
}

#[tokio::test]
async fn disabled_review_is_recorded_as_skipped() {
    let config = PipelineConfig {
        review_enabled: false,
        ..test_config()
    };
    let harness = Harness::with(ScriptedGenerator::with_days(2), StaticLookup::default(), config);
    let (run_id, result) = run_to_completion(&harness, "Trusting God", 2, "topical").await;

    assert!(result.review.is_none());
    assert_eq!(harness.llm.count("Review day "), 0);
    assert!(result.published);

    let history = harness.service.get_run_status(run_id).await.unwrap().history;
    let review_entry = history
        .iter()
        .find(|h| h.phase == WorkflowPhase::ReviewQuality)
        .unwrap();
    assert_eq!(review_entry.message.as_deref(), Some("skipped"));
}

// ===========================================================================
// References
// ===========================================================================

#[tokio::test]
async fn invalid_references_are_reported_but_do_not_block() {
    let harness = Harness::with(
        ScriptedGenerator::with_days(2),
        StaticLookup::rejecting(&["Psalms 2"]),
        test_config(),
    );
    let (_, result) = run_to_completion(&harness, "Trusting God", 2, "topical").await;

    assert_eq!(result.references.valid, 1);
    assert_eq!(result.references.invalid, 1);
    assert_eq!(result.references.invalid_references().collect::<Vec<_>>(), vec!["Psalms 2"]);
    assert!(result.published);
    assert!(result.publication_note.unwrap().contains("unverified"));
}

#[tokio::test]
async fn unavailable_reference_service_degrades_gracefully() {
    let harness = Harness::with(ScriptedGenerator::with_days(2), StaticLookup::down(), test_config());
    let (_, result) = run_to_completion(&harness, "Trusting God", 2, "topical").await;

    assert_eq!(result.references.unavailable, 2);
    assert!(result.references.checks.iter().all(|c| c.source == CheckSource::Unavailable));
    assert!(harness.cache.is_empty().await);
}

#[tokio::test]
async fn second_run_reuses_cached_validations() {
    let harness = Harness::new(ScriptedGenerator::with_days(2));
    run_to_completion(&harness, "Trusting God", 2, "topical").await;
    let first = harness.lookup.calls();
    assert_eq!(first, 2);

    let (_, result) = run_to_completion(&harness, "Trusting God", 2, "topical").await;
    assert_eq!(harness.lookup.calls(), first);
    assert!(result.references.checks.iter().all(|c| c.source == CheckSource::Cache));
}

#[tokio::test]
async fn prose_in_place_of_a_reference_never_reaches_the_service() {
    let plan = plan_json(2, |day| if day == 2 { "see above".to_string() } else { format!("Psalms {day}") });
    let harness = Harness::new(ScriptedGenerator::with_plan(plan));
    let (_, result) = run_to_completion(&harness, "Trusting God", 2, "topical").await;

    assert_eq!(harness.lookup.calls(), 1);
    let prose = result
        .references
        .checks
        .iter()
        .find(|c| c.original == "see above")
        .expect("prose reference is still reported");
    assert_eq!(prose.source, CheckSource::Malformed);
    assert_eq!(result.references.valid, 1);
    assert_eq!(result.references.invalid_references().collect::<Vec<_>>(), vec!["see above"]);
}

// ===========================================================================
// Failure and cancellation
// ===========================================================================

#[tokio::test]
async fn planning_failure_fails_the_run() {
    let harness = Harness::new(ScriptedGenerator::without_plan());
    let run_id = harness.service.submit(request("Trusting God", 3, "topical")).await.unwrap();

    let err = harness.service.execute_run(run_id).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::RunFailed {
            phase: WorkflowPhase::PlanStudy,
            ..
        }
    ));

    let run = harness.service.get_run_status(run_id).await.unwrap().run;
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.phase, WorkflowPhase::Failed);
    assert_eq!(run.failed_phase, Some(WorkflowPhase::PlanStudy));
    assert!(run.error_message.unwrap().contains("planning failed"));
    assert_eq!(run.progress, 10);
    assert_eq!(harness.llm.count("Write day "), 0);

    let err = harness.service.get_result(run_id).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::ResultNotReady {
            status: RunStatus::Failed,
            ..
        }
    ));
}

#[tokio::test]
async fn unusable_plan_fails_the_run() {
    let harness = Harness::new(ScriptedGenerator::with_plan("I'm sorry, I can't help with that.".to_string()));
    let run_id = harness.service.submit(request("Trusting God", 3, "topical")).await.unwrap();
    let err = harness.service.execute_run(run_id).await.unwrap_err();
    assert!(matches!(err, PipelineError::RunFailed { .. }));
}

#[tokio::test]
async fn cancelled_run_stops_and_stays_cancelled() {
    let llm = ScriptedGenerator::with_days(6).content_delay(Duration::from_millis(150));
    let harness = Harness::new(llm);
    let run_id = harness.service.start_run(request("Trusting God", 6, "topical")).await.unwrap();

    wait_for_phase(&harness, run_id, WorkflowPhase::GenerateContent).await;
    harness.service.cancel_run(run_id).await.unwrap();
    assert_eq!(wait_for_terminal(&harness, run_id).await, RunStatus::Cancelled);

    // Give the background task time to observe the token and unwind.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let run = harness.service.get_run_status(run_id).await.unwrap().run;
    assert_eq!(run.status, RunStatus::Cancelled);
    assert!(run.progress < 100);
    assert_eq!(harness.llm.count("Review day "), 0);
    assert!(harness.publisher.published().await.is_empty());

    let err = harness.service.get_result(run_id).await.unwrap_err();
    assert!(matches!(err, PipelineError::ResultNotReady { .. }));
    let err = harness.service.cancel_run(run_id).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::AlreadyFinished {
            status: RunStatus::Cancelled,
            ..
        }
    ));
}

#[tokio::test]
async fn finished_run_cannot_be_cancelled_or_rerun() {
    let harness = Harness::new(ScriptedGenerator::with_days(1));
    let (run_id, _) = run_to_completion(&harness, "Trusting God", 1, "topical").await;

    let err = harness.service.cancel_run(run_id).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::AlreadyFinished {
            status: RunStatus::Succeeded,
            ..
        }
    ));
    let err = harness.service.execute_run(run_id).await.unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyFinished { .. }));
}

#[tokio::test]
async fn unknown_run_is_not_found() {
    let harness = Harness::new(ScriptedGenerator::with_days(1));
    let missing = Uuid::new_v4();
    assert!(matches!(
        harness.service.get_run_status(missing).await.unwrap_err(),
        PipelineError::NotFound(id) if id == missing
    ));
    assert!(matches!(
        harness.service.cancel_run(missing).await.unwrap_err(),
        PipelineError::NotFound(_)
    ));
    assert!(matches!(
        harness.service.get_result(missing).await.unwrap_err(),
        PipelineError::NotFound(_)
    ));
}

#[tokio::test]
async fn invalid_request_creates_no_run() {
    let harness = Harness::new(ScriptedGenerator::with_days(1));
    let err = harness.service.submit(request("Trusting God", 0, "topical")).await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation(_)));
    assert!(harness.service.list_runs().await.unwrap().is_empty());
}
