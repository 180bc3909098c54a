//! Database query functions for the `run_artifacts` table.

use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ArtifactKind, RunArtifact};

/// Insert or replace the checkpoint of `kind` for a run.
pub async fn upsert_artifact(
    pool: &PgPool,
    run_id: Uuid,
    kind: ArtifactKind,
    payload: &Value,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO run_artifacts (run_id, kind, payload) VALUES ($1, $2, $3) \
         ON CONFLICT (run_id, kind) DO UPDATE SET payload = EXCLUDED.payload, updated_at = now()",
    )
    .bind(run_id)
    .bind(kind)
    .bind(payload)
    .execute(pool)
    .await
    .with_context(|| format!("failed to save {kind} artifact for run {run_id}"))?;

    Ok(())
}

/// Fetch the checkpoint of `kind` for a run.
pub async fn get_artifact(
    pool: &PgPool,
    run_id: Uuid,
    kind: ArtifactKind,
) -> Result<Option<RunArtifact>> {
    let row = sqlx::query_as::<_, RunArtifact>(
        "SELECT * FROM run_artifacts WHERE run_id = $1 AND kind = $2",
    )
    .bind(run_id)
    .bind(kind)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to fetch {kind} artifact for run {run_id}"))?;

    Ok(row)
}
