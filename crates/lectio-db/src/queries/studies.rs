//! Database query functions for the `studies` and `study_days` tables.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Study, StudyDay};

/// Insert a study and all of its day documents in a single transaction.
///
/// If any day fails to insert, the whole study is rolled back.
pub async fn insert_study_with_days(pool: &PgPool, study: &Study, days: &[StudyDay]) -> Result<Study> {
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let inserted = sqlx::query_as::<_, Study>(
        "INSERT INTO studies \
         (id, run_id, owner_id, title, theme, description, duration_days, style, metadata) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING *",
    )
    .bind(study.id)
    .bind(study.run_id)
    .bind(&study.owner_id)
    .bind(&study.title)
    .bind(&study.theme)
    .bind(&study.description)
    .bind(study.duration_days)
    .bind(study.style)
    .bind(&study.metadata)
    .fetch_one(&mut *tx)
    .await
    .with_context(|| format!("failed to insert study for run {}", study.run_id))?;

    for day in days {
        sqlx::query(
            "INSERT INTO study_days (study_id, day_number, title, is_fallback, content) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(inserted.id)
        .bind(day.day_number)
        .bind(&day.title)
        .bind(day.is_fallback)
        .bind(&day.content)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to insert day {} of study {}", day.day_number, inserted.id))?;
    }

    tx.commit().await.context("failed to commit transaction")?;

    Ok(inserted)
}

/// Fetch a study by its ID.
pub async fn get_study(pool: &PgPool, id: Uuid) -> Result<Option<Study>> {
    let study = sqlx::query_as::<_, Study>("SELECT * FROM studies WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch study")?;

    Ok(study)
}

/// List the day documents of a study in day order.
pub async fn list_study_days(pool: &PgPool, study_id: Uuid) -> Result<Vec<StudyDay>> {
    let days = sqlx::query_as::<_, StudyDay>(
        "SELECT * FROM study_days WHERE study_id = $1 ORDER BY day_number ASC",
    )
    .bind(study_id)
    .fetch_all(pool)
    .await
    .with_context(|| format!("failed to list days for study {study_id}"))?;

    Ok(days)
}
