//! Database query functions for the `generation_requests` table.

use anyhow::{Context, Result};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::GenerationRequest;

/// Insert a request row inside an open connection or transaction.
pub async fn insert_request(
    conn: &mut PgConnection,
    request: &GenerationRequest,
) -> Result<GenerationRequest> {
    let row = sqlx::query_as::<_, GenerationRequest>(
        "INSERT INTO generation_requests \
         (id, owner_id, brief, title, duration_days, style, difficulty, audience, special_instructions, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         RETURNING *",
    )
    .bind(request.id)
    .bind(&request.owner_id)
    .bind(&request.brief)
    .bind(&request.title)
    .bind(request.duration_days)
    .bind(request.style)
    .bind(request.difficulty)
    .bind(&request.audience)
    .bind(&request.special_instructions)
    .bind(request.created_at)
    .fetch_one(conn)
    .await
    .with_context(|| format!("failed to insert generation request {}", request.id))?;

    Ok(row)
}

/// Fetch a request by its ID.
pub async fn get_request(pool: &PgPool, id: Uuid) -> Result<Option<GenerationRequest>> {
    let row = sqlx::query_as::<_, GenerationRequest>(
        "SELECT * FROM generation_requests WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch generation request")?;

    Ok(row)
}
