//! Run service: the surface the CLI and HTTP API drive.
//!
//! Runs started here execute on background tasks. Each active run has a
//! cancellation token registered so `cancel_run` can interrupt it in this
//! process; runs owned by another process are cancelled through the store
//! and notice at their next phase boundary.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use lectio_db::models::{ArtifactKind, PhaseTransition, RunStatus, WorkflowRun};

use super::{Pipeline, RunOutcome, StudyResult, run_workflow};
use crate::error::PipelineError;
use crate::request::{NewGenerationRequest, validate_request};

/// Current state of a run plus its full phase history.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub run: WorkflowRun,
    pub history: Vec<PhaseTransition>,
}

#[derive(Clone)]
pub struct RunService {
    pipeline: Arc<Pipeline>,
    active: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl RunService {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Validate and persist a request with a fresh `pending` run, without
    /// executing it.
    pub async fn submit(&self, new: NewGenerationRequest) -> Result<Uuid, PipelineError> {
        let request = validate_request(&new)?;
        let run = self.pipeline.store().create_run(&request).await?;
        tracing::info!(run_id = %run.id, request_id = %request.id, days = request.duration_days, "run created");
        Ok(run.id)
    }

    /// Submit a request and execute it on a background task.
    pub async fn start_run(&self, new: NewGenerationRequest) -> Result<Uuid, PipelineError> {
        let run_id = self.submit(new).await?;
        let service = self.clone();
        tokio::spawn(async move {
            match service.execute_run(run_id).await {
                Ok(RunOutcome::Succeeded(_)) => {}
                Ok(RunOutcome::Cancelled { phase }) => {
                    tracing::info!(%run_id, %phase, "background run cancelled");
                }
                Err(e) => tracing::error!(%run_id, error = %e, "background run failed"),
            }
        });
        Ok(run_id)
    }

    /// Execute a submitted run on the current task.
    pub async fn execute_run(&self, run_id: Uuid) -> Result<RunOutcome, PipelineError> {
        let cancel = CancellationToken::new();
        self.active.lock().await.insert(run_id, cancel.clone());
        let outcome = run_workflow(&self.pipeline, run_id, &cancel).await;
        self.active.lock().await.remove(&run_id);
        outcome
    }

    pub async fn get_run_status(&self, run_id: Uuid) -> Result<RunSnapshot, PipelineError> {
        let store = self.pipeline.store();
        let run = store.get_run(run_id).await?.ok_or(PipelineError::NotFound(run_id))?;
        let history = store.phase_history(run_id).await?;
        Ok(RunSnapshot { run, history })
    }

    pub async fn list_runs(&self) -> Result<Vec<WorkflowRun>, PipelineError> {
        Ok(self.pipeline.store().list_runs().await?)
    }

    /// Request cancellation of an active run.
    ///
    /// The run is marked `cancelled` immediately; work in flight stops at
    /// the next cancellation point.
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<(), PipelineError> {
        let store = self.pipeline.store();
        let run = store.get_run(run_id).await?.ok_or(PipelineError::NotFound(run_id))?;
        if run.status.is_terminal() || !store.cancel_run(run_id).await? {
            let status = match store.get_run(run_id).await? {
                Some(current) => current.status,
                None => run.status,
            };
            return Err(PipelineError::AlreadyFinished { run_id, status });
        }
        if let Some(token) = self.active.lock().await.get(&run_id) {
            token.cancel();
        }
        tracing::info!(%run_id, phase = %run.phase, "run cancellation requested");
        Ok(())
    }

    /// The final result of a succeeded run.
    pub async fn get_result(&self, run_id: Uuid) -> Result<StudyResult, PipelineError> {
        let store = self.pipeline.store();
        let run = store.get_run(run_id).await?.ok_or(PipelineError::NotFound(run_id))?;
        if run.status != RunStatus::Succeeded {
            return Err(PipelineError::ResultNotReady {
                run_id,
                status: run.status,
            });
        }
        let payload = store
            .load_artifact(run_id, ArtifactKind::Result)
            .await?
            .ok_or_else(|| anyhow::anyhow!("run {run_id} succeeded but has no result artifact"))?;
        let result = serde_json::from_value(payload)
            .map_err(|e| anyhow::anyhow!("result artifact for run {run_id} is corrupt: {e}"))?;
        Ok(result)
    }

    /// Cancel every run executing in this process. Used on shutdown.
    pub async fn cancel_all(&self) {
        let active = self.active.lock().await;
        for (run_id, token) in active.iter() {
            tracing::info!(%run_id, "cancelling run on shutdown");
            token.cancel();
        }
    }
}
