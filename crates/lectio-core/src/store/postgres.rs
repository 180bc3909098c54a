//! PostgreSQL collaborators backed by the `lectio-db` query layer.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use lectio_db::models::{
    ArtifactKind, GenerationRequest, PhaseTransition, ReferenceValidation, RunStatus, Study, StudyDay,
    WorkflowPhase, WorkflowRun,
};
use lectio_db::queries::{artifacts, references, requests, runs, studies};

use super::{PublishedStudy, Publisher, ReferenceCache, RunStore, RunUpdate};

/// [`RunStore`] over the `generation_requests`, `workflow_runs`,
/// `phase_transitions` and `run_artifacts` tables.
#[derive(Clone)]
pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn create_run(&self, request: &GenerationRequest) -> Result<WorkflowRun> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        requests::insert_request(&mut tx, request).await?;
        let run = runs::insert_run(&mut tx, Uuid::new_v4(), request.id).await?;
        runs::insert_phase_transition(
            &mut tx,
            run.id,
            WorkflowPhase::ParseRequest,
            RunStatus::Pending,
            0,
            Some("run created"),
        )
        .await?;
        tx.commit().await.context("failed to commit new run")?;
        Ok(run)
    }

    async fn get_request(&self, request_id: Uuid) -> Result<Option<GenerationRequest>> {
        requests::get_request(&self.pool, request_id).await
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>> {
        runs::get_run(&self.pool, run_id).await
    }

    async fn list_runs(&self) -> Result<Vec<WorkflowRun>> {
        runs::list_runs(&self.pool).await
    }

    async fn record_transition(&self, run_id: Uuid, update: &RunUpdate) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;

        match update {
            RunUpdate::Advance {
                phase,
                status,
                progress,
                message,
            } => {
                if runs::advance_run(&mut tx, run_id, *phase, *status, *progress).await? == 0 {
                    return Ok(false);
                }
                let stored = runs::run_progress(&mut tx, run_id).await?.unwrap_or(*progress);
                runs::insert_phase_transition(&mut tx, run_id, *phase, *status, stored, message.as_deref())
                    .await?;
            }
            RunUpdate::Fail {
                failed_phase,
                message,
            } => {
                if runs::fail_run(&mut tx, run_id, *failed_phase, message).await? == 0 {
                    return Ok(false);
                }
                let progress = runs::run_progress(&mut tx, run_id).await?.unwrap_or_default();
                runs::insert_phase_transition(
                    &mut tx,
                    run_id,
                    WorkflowPhase::Failed,
                    RunStatus::Failed,
                    progress,
                    Some(message),
                )
                .await?;
            }
        }

        tx.commit()
            .await
            .with_context(|| format!("failed to commit transition for run {run_id}"))?;
        Ok(true)
    }

    async fn cancel_run(&self, run_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("failed to begin transaction")?;
        let Some((phase, progress)) = runs::cancel_run(&mut tx, run_id).await? else {
            return Ok(false);
        };
        runs::insert_phase_transition(
            &mut tx,
            run_id,
            phase,
            RunStatus::Cancelled,
            progress,
            Some("cancellation requested"),
        )
        .await?;
        tx.commit()
            .await
            .with_context(|| format!("failed to commit cancellation of run {run_id}"))?;
        Ok(true)
    }

    async fn phase_history(&self, run_id: Uuid) -> Result<Vec<PhaseTransition>> {
        runs::list_phase_history(&self.pool, run_id).await
    }

    async fn save_artifact(&self, run_id: Uuid, kind: ArtifactKind, payload: &serde_json::Value) -> Result<()> {
        artifacts::upsert_artifact(&self.pool, run_id, kind, payload).await
    }

    async fn load_artifact(&self, run_id: Uuid, kind: ArtifactKind) -> Result<Option<serde_json::Value>> {
        Ok(artifacts::get_artifact(&self.pool, run_id, kind)
            .await?
            .map(|artifact| artifact.payload))
    }
}

/// [`ReferenceCache`] over the `reference_validations` table.
#[derive(Clone)]
pub struct PgReferenceCache {
    pool: PgPool,
}

impl PgReferenceCache {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReferenceCache for PgReferenceCache {
    async fn get(&self, reference: &str) -> Result<Option<ReferenceValidation>> {
        references::get_reference(&self.pool, reference).await
    }

    async fn put(&self, entry: &ReferenceValidation) -> Result<()> {
        references::upsert_reference(&self.pool, entry).await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        references::purge_expired(&self.pool, now).await
    }
}

/// [`Publisher`] writing to the `studies` and `study_days` tables.
#[derive(Clone)]
pub struct PgPublisher {
    pool: PgPool,
}

impl PgPublisher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Publisher for PgPublisher {
    async fn publish(&self, study: &PublishedStudy) -> Result<Uuid> {
        let row = Study {
            id: Uuid::new_v4(),
            run_id: study.run_id,
            owner_id: study.owner_id.clone(),
            title: study.title.clone(),
            theme: study.theme.clone(),
            description: study.description.clone(),
            duration_days: study.duration_days,
            style: study.style,
            metadata: study.metadata.clone(),
            created_at: Utc::now(),
        };
        let days: Vec<StudyDay> = study
            .days
            .iter()
            .map(|day| StudyDay {
                study_id: row.id,
                day_number: day.day_number,
                title: day.title.clone(),
                is_fallback: day.is_fallback,
                content: day.content.clone(),
            })
            .collect();

        let inserted = studies::insert_study_with_days(&self.pool, &row, &days).await?;
        tracing::info!(study_id = %inserted.id, run_id = %study.run_id, days = days.len(), "study published");
        Ok(inserted.id)
    }
}
