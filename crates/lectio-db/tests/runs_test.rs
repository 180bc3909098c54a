//! Integration tests for request, run, and phase-history queries.
//!
//! These need a PostgreSQL server: either `LECTIO_TEST_PG_URL` or a
//! container runtime for testcontainers.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use lectio_db::models::{
    ArtifactKind, ContentStyle, Difficulty, GenerationRequest, RunStatus, WorkflowPhase,
};
use lectio_db::queries::{artifacts, requests, runs};
use lectio_test_utils::{create_test_db, drop_test_db};

fn sample_request() -> GenerationRequest {
    GenerationRequest {
        id: Uuid::new_v4(),
        owner_id: "owner-1".to_string(),
        brief: "A week on hope".to_string(),
        title: "Hope".to_string(),
        duration_days: 7,
        style: ContentStyle::Devotional,
        difficulty: Difficulty::Beginner,
        audience: "adults".to_string(),
        special_instructions: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn insert_and_fetch_run() {
    let (pool, db_name) = create_test_db().await;
    let request = sample_request();
    let run_id = Uuid::new_v4();

    let mut conn = pool.acquire().await.unwrap();
    requests::insert_request(&mut conn, &request).await.unwrap();
    let run = runs::insert_run(&mut conn, run_id, request.id).await.unwrap();
    drop(conn);

    assert_eq!(run.status, RunStatus::Pending);
    assert_eq!(run.phase, WorkflowPhase::ParseRequest);
    assert_eq!(run.progress, 0);

    let fetched = requests::get_request(&pool, request.id).await.unwrap().unwrap();
    assert_eq!(fetched.style, ContentStyle::Devotional);
    assert_eq!(fetched.duration_days, 7);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn progress_never_decreases() {
    let (pool, db_name) = create_test_db().await;
    let request = sample_request();
    let run_id = Uuid::new_v4();

    let mut conn = pool.acquire().await.unwrap();
    requests::insert_request(&mut conn, &request).await.unwrap();
    runs::insert_run(&mut conn, run_id, request.id).await.unwrap();
    runs::advance_run(&mut conn, run_id, WorkflowPhase::GenerateContent, RunStatus::Running, 25)
        .await
        .unwrap();
    runs::advance_run(&mut conn, run_id, WorkflowPhase::GenerateContent, RunStatus::Running, 10)
        .await
        .unwrap();
    drop(conn);

    let run = runs::get_run(&pool, run_id).await.unwrap().unwrap();
    assert_eq!(run.progress, 25);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn cancelled_run_rejects_further_transitions() {
    let (pool, db_name) = create_test_db().await;
    let request = sample_request();
    let run_id = Uuid::new_v4();

    let mut conn = pool.acquire().await.unwrap();
    requests::insert_request(&mut conn, &request).await.unwrap();
    runs::insert_run(&mut conn, run_id, request.id).await.unwrap();
    drop(conn);

    let mut conn = pool.acquire().await.unwrap();
    assert_eq!(
        runs::cancel_run(&mut conn, run_id).await.unwrap(),
        Some((WorkflowPhase::ParseRequest, 0))
    );
    assert_eq!(runs::cancel_run(&mut conn, run_id).await.unwrap(), None);

    let rows = runs::advance_run(&mut conn, run_id, WorkflowPhase::PlanStudy, RunStatus::Running, 10)
        .await
        .unwrap();
    assert_eq!(rows, 0);
    let rows = runs::fail_run(&mut conn, run_id, WorkflowPhase::PlanStudy, "boom")
        .await
        .unwrap();
    assert_eq!(rows, 0);
    drop(conn);

    let run = runs::get_run(&pool, run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Cancelled);
    assert!(run.completed_at.is_some());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn failed_run_keeps_progress_and_records_phase() {
    let (pool, db_name) = create_test_db().await;
    let request = sample_request();
    let run_id = Uuid::new_v4();

    let mut conn = pool.acquire().await.unwrap();
    requests::insert_request(&mut conn, &request).await.unwrap();
    runs::insert_run(&mut conn, run_id, request.id).await.unwrap();
    runs::advance_run(&mut conn, run_id, WorkflowPhase::PlanStudy, RunStatus::Running, 10)
        .await
        .unwrap();
    runs::insert_phase_transition(&mut conn, run_id, WorkflowPhase::PlanStudy, RunStatus::Running, 10, None)
        .await
        .unwrap();
    runs::fail_run(&mut conn, run_id, WorkflowPhase::PlanStudy, "planning produced no days")
        .await
        .unwrap();
    runs::insert_phase_transition(
        &mut conn,
        run_id,
        WorkflowPhase::Failed,
        RunStatus::Failed,
        10,
        Some("planning produced no days"),
    )
    .await
    .unwrap();
    drop(conn);

    let run = runs::get_run(&pool, run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.phase, WorkflowPhase::Failed);
    assert_eq!(run.failed_phase, Some(WorkflowPhase::PlanStudy));
    assert_eq!(run.progress, 10);
    assert_eq!(run.error_message.as_deref(), Some("planning produced no days"));

    let history = runs::list_phase_history(&pool, run_id).await.unwrap();
    let phases: Vec<_> = history.iter().map(|h| h.phase).collect();
    assert_eq!(phases, vec![WorkflowPhase::PlanStudy, WorkflowPhase::Failed]);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn artifacts_upsert_replaces_payload() {
    let (pool, db_name) = create_test_db().await;
    let request = sample_request();
    let run_id = Uuid::new_v4();

    let mut conn = pool.acquire().await.unwrap();
    requests::insert_request(&mut conn, &request).await.unwrap();
    runs::insert_run(&mut conn, run_id, request.id).await.unwrap();
    drop(conn);

    artifacts::upsert_artifact(&pool, run_id, ArtifactKind::Plan, &json!({"v": 1}))
        .await
        .unwrap();
    artifacts::upsert_artifact(&pool, run_id, ArtifactKind::Plan, &json!({"v": 2}))
        .await
        .unwrap();

    let artifact = artifacts::get_artifact(&pool, run_id, ArtifactKind::Plan)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(artifact.payload, json!({"v": 2}));
    assert!(
        artifacts::get_artifact(&pool, run_id, ArtifactKind::Days)
            .await
            .unwrap()
            .is_none()
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}
