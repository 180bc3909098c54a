//! Database query functions for the `reference_validations` cache table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::ReferenceValidation;

/// Fetch a cache entry by normalized reference, fresh or not.
pub async fn get_reference(pool: &PgPool, reference: &str) -> Result<Option<ReferenceValidation>> {
    let row = sqlx::query_as::<_, ReferenceValidation>(
        "SELECT * FROM reference_validations WHERE reference = $1",
    )
    .bind(reference)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to fetch cached reference {reference:?}"))?;

    Ok(row)
}

/// Insert or overwrite a cache entry. Last writer wins.
pub async fn upsert_reference(pool: &PgPool, entry: &ReferenceValidation) -> Result<()> {
    sqlx::query(
        "INSERT INTO reference_validations \
         (reference, is_valid, resolved_text, upstream_error, validated_at, expires_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (reference) DO UPDATE SET \
             is_valid = EXCLUDED.is_valid, \
             resolved_text = EXCLUDED.resolved_text, \
             upstream_error = EXCLUDED.upstream_error, \
             validated_at = EXCLUDED.validated_at, \
             expires_at = EXCLUDED.expires_at",
    )
    .bind(&entry.reference)
    .bind(entry.is_valid)
    .bind(&entry.resolved_text)
    .bind(&entry.upstream_error)
    .bind(entry.validated_at)
    .bind(entry.expires_at)
    .execute(pool)
    .await
    .with_context(|| format!("failed to cache reference {:?}", entry.reference))?;

    Ok(())
}

/// Delete every entry that expired at or before `now`. Returns the count.
pub async fn purge_expired(pool: &PgPool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM reference_validations WHERE expires_at <= $1")
        .bind(now)
        .execute(pool)
        .await
        .context("failed to purge expired references")?;

    Ok(result.rows_affected())
}
