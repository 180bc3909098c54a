//! Database query functions for the `workflow_runs` and `phase_transitions`
//! tables.
//!
//! Every mutating query only touches runs that are still `pending` or
//! `running`, so a cancelled or finished run can never be resurrected by a
//! late write from the orchestrator.

use anyhow::{Context, Result};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::{PhaseTransition, RunStatus, WorkflowPhase, WorkflowRun};

/// Insert a new run row in `pending` status.
pub async fn insert_run(conn: &mut PgConnection, id: Uuid, request_id: Uuid) -> Result<WorkflowRun> {
    let run = sqlx::query_as::<_, WorkflowRun>(
        "INSERT INTO workflow_runs (id, request_id) \
         VALUES ($1, $2) \
         RETURNING *",
    )
    .bind(id)
    .bind(request_id)
    .fetch_one(conn)
    .await
    .with_context(|| format!("failed to insert workflow run {id}"))?;

    Ok(run)
}

/// Fetch a run by its ID.
pub async fn get_run(pool: &PgPool, id: Uuid) -> Result<Option<WorkflowRun>> {
    let run = sqlx::query_as::<_, WorkflowRun>("SELECT * FROM workflow_runs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch workflow run")?;

    Ok(run)
}

/// List all runs, newest first.
pub async fn list_runs(pool: &PgPool) -> Result<Vec<WorkflowRun>> {
    let runs =
        sqlx::query_as::<_, WorkflowRun>("SELECT * FROM workflow_runs ORDER BY started_at DESC")
            .fetch_all(pool)
            .await
            .context("failed to list workflow runs")?;

    Ok(runs)
}

/// Move an active run to `phase` with the given status and progress.
///
/// Progress never decreases (`GREATEST`). Sets `completed_at` when the new
/// status is terminal. Returns the number of rows affected: `0` means the
/// run does not exist or is no longer active.
pub async fn advance_run(
    conn: &mut PgConnection,
    id: Uuid,
    phase: WorkflowPhase,
    status: RunStatus,
    progress: i32,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE workflow_runs \
         SET phase = $2, status = $3, progress = GREATEST(progress, $4), updated_at = now(), \
             completed_at = CASE WHEN $3 IN ('succeeded', 'failed', 'cancelled') THEN now() ELSE completed_at END \
         WHERE id = $1 AND status IN ('pending', 'running')",
    )
    .bind(id)
    .bind(phase)
    .bind(status)
    .bind(progress)
    .execute(conn)
    .await
    .with_context(|| format!("failed to advance run {id} to {phase}"))?;

    Ok(result.rows_affected())
}

/// Mark an active run as failed, recording the phase it failed in.
///
/// Progress is left untouched.
pub async fn fail_run(
    conn: &mut PgConnection,
    id: Uuid,
    failed_phase: WorkflowPhase,
    message: &str,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE workflow_runs \
         SET phase = 'failed', status = 'failed', failed_phase = $2, error_message = $3, \
             updated_at = now(), completed_at = now() \
         WHERE id = $1 AND status IN ('pending', 'running')",
    )
    .bind(id)
    .bind(failed_phase)
    .bind(message)
    .execute(conn)
    .await
    .with_context(|| format!("failed to mark run {id} as failed"))?;

    Ok(result.rows_affected())
}

/// Current progress of a run, read on the caller's connection so it can
/// share a transaction with an update.
pub async fn run_progress(conn: &mut PgConnection, id: Uuid) -> Result<Option<i32>> {
    let progress = sqlx::query_scalar::<_, i32>("SELECT progress FROM workflow_runs WHERE id = $1")
        .bind(id)
        .fetch_optional(conn)
        .await
        .with_context(|| format!("failed to read progress of run {id}"))?;

    Ok(progress)
}

/// Request cancellation of an active run.
///
/// Returns the phase and progress the run was cancelled at, or `None` when
/// the run was no longer active.
pub async fn cancel_run(conn: &mut PgConnection, id: Uuid) -> Result<Option<(WorkflowPhase, i32)>> {
    let cancelled = sqlx::query_as::<_, (WorkflowPhase, i32)>(
        "UPDATE workflow_runs \
         SET status = 'cancelled', updated_at = now(), completed_at = now() \
         WHERE id = $1 AND status IN ('pending', 'running') \
         RETURNING phase, progress",
    )
    .bind(id)
    .fetch_optional(conn)
    .await
    .with_context(|| format!("failed to cancel run {id}"))?;

    Ok(cancelled)
}

/// Append a phase transition to the audit history.
pub async fn insert_phase_transition(
    conn: &mut PgConnection,
    run_id: Uuid,
    phase: WorkflowPhase,
    status: RunStatus,
    progress: i32,
    message: Option<&str>,
) -> Result<PhaseTransition> {
    let row = sqlx::query_as::<_, PhaseTransition>(
        "INSERT INTO phase_transitions (run_id, phase, status, progress, message) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(run_id)
    .bind(phase)
    .bind(status)
    .bind(progress)
    .bind(message)
    .fetch_one(conn)
    .await
    .with_context(|| format!("failed to record {phase} transition for run {run_id}"))?;

    Ok(row)
}

/// Phase history of a run, oldest first.
pub async fn list_phase_history(pool: &PgPool, run_id: Uuid) -> Result<Vec<PhaseTransition>> {
    let rows = sqlx::query_as::<_, PhaseTransition>(
        "SELECT * FROM phase_transitions WHERE run_id = $1 ORDER BY id ASC",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list phase history for run {run_id}"))?;

    Ok(rows)
}
