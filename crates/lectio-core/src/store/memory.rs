//! In-memory collaborators with the same semantics as the PostgreSQL ones.

use std::collections::HashMap;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use lectio_db::models::{
    ArtifactKind, GenerationRequest, PhaseTransition, ReferenceValidation, RunStatus, WorkflowPhase,
    WorkflowRun,
};

use super::{PublishedStudy, Publisher, ReferenceCache, RunStore, RunUpdate};

#[derive(Default)]
struct RunTables {
    requests: HashMap<Uuid, GenerationRequest>,
    runs: HashMap<Uuid, WorkflowRun>,
    history: HashMap<Uuid, Vec<PhaseTransition>>,
    artifacts: HashMap<(Uuid, ArtifactKind), serde_json::Value>,
    next_transition_id: i64,
}

impl RunTables {
    fn push_history(
        &mut self,
        run_id: Uuid,
        phase: WorkflowPhase,
        status: RunStatus,
        progress: i32,
        message: Option<String>,
    ) {
        self.next_transition_id += 1;
        let entry = PhaseTransition {
            id: self.next_transition_id,
            run_id,
            phase,
            status,
            progress,
            message,
            recorded_at: Utc::now(),
        };
        self.history.entry(run_id).or_default().push(entry);
    }
}

/// [`RunStore`] held in process memory.
#[derive(Default)]
pub struct MemoryRunStore {
    tables: Mutex<RunTables>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create_run(&self, request: &GenerationRequest) -> Result<WorkflowRun> {
        let mut tables = self.tables.lock().await;
        if tables.requests.contains_key(&request.id) {
            bail!("request {} already exists", request.id);
        }
        let now = Utc::now();
        let run = WorkflowRun {
            id: Uuid::new_v4(),
            request_id: request.id,
            phase: WorkflowPhase::ParseRequest,
            status: RunStatus::Pending,
            progress: 0,
            error_message: None,
            failed_phase: None,
            started_at: now,
            completed_at: None,
            updated_at: now,
        };
        tables.requests.insert(request.id, request.clone());
        tables.runs.insert(run.id, run.clone());
        tables.push_history(
            run.id,
            WorkflowPhase::ParseRequest,
            RunStatus::Pending,
            0,
            Some("run created".to_string()),
        );
        Ok(run)
    }

    async fn get_request(&self, request_id: Uuid) -> Result<Option<GenerationRequest>> {
        Ok(self.tables.lock().await.requests.get(&request_id).cloned())
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>> {
        Ok(self.tables.lock().await.runs.get(&run_id).cloned())
    }

    async fn list_runs(&self) -> Result<Vec<WorkflowRun>> {
        let mut runs: Vec<_> = self.tables.lock().await.runs.values().cloned().collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    async fn record_transition(&self, run_id: Uuid, update: &RunUpdate) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let Some(run) = tables.runs.get_mut(&run_id) else {
            return Ok(false);
        };
        if run.status.is_terminal() {
            return Ok(false);
        }

        let now = Utc::now();
        run.updated_at = now;
        let (phase, status, progress, message) = match update {
            RunUpdate::Advance {
                phase,
                status,
                progress,
                message,
            } => {
                run.phase = *phase;
                run.status = *status;
                run.progress = run.progress.max(*progress);
                if status.is_terminal() {
                    run.completed_at = Some(now);
                }
                (*phase, *status, run.progress, message.clone())
            }
            RunUpdate::Fail {
                failed_phase,
                message,
            } => {
                run.phase = WorkflowPhase::Failed;
                run.status = RunStatus::Failed;
                run.failed_phase = Some(*failed_phase);
                run.error_message = Some(message.clone());
                run.completed_at = Some(now);
                (
                    WorkflowPhase::Failed,
                    RunStatus::Failed,
                    run.progress,
                    Some(message.clone()),
                )
            }
        };
        tables.push_history(run_id, phase, status, progress, message);
        Ok(true)
    }

    async fn cancel_run(&self, run_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let Some(run) = tables.runs.get_mut(&run_id) else {
            return Ok(false);
        };
        if run.status.is_terminal() {
            return Ok(false);
        }
        let now = Utc::now();
        run.status = RunStatus::Cancelled;
        run.updated_at = now;
        run.completed_at = Some(now);
        let (phase, progress) = (run.phase, run.progress);
        tables.push_history(
            run_id,
            phase,
            RunStatus::Cancelled,
            progress,
            Some("cancellation requested".to_string()),
        );
        Ok(true)
    }

    async fn phase_history(&self, run_id: Uuid) -> Result<Vec<PhaseTransition>> {
        Ok(self
            .tables
            .lock()
            .await
            .history
            .get(&run_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_artifact(&self, run_id: Uuid, kind: ArtifactKind, payload: &serde_json::Value) -> Result<()> {
        self.tables
            .lock()
            .await
            .artifacts
            .insert((run_id, kind), payload.clone());
        Ok(())
    }

    async fn load_artifact(&self, run_id: Uuid, kind: ArtifactKind) -> Result<Option<serde_json::Value>> {
        Ok(self.tables.lock().await.artifacts.get(&(run_id, kind)).cloned())
    }
}

/// [`ReferenceCache`] held in process memory.
#[derive(Default)]
pub struct MemoryReferenceCache {
    entries: Mutex<HashMap<String, ReferenceValidation>>,
}

impl MemoryReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite an entry directly.
    pub async fn insert(&self, entry: ReferenceValidation) {
        self.entries.lock().await.insert(entry.reference.clone(), entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl ReferenceCache for MemoryReferenceCache {
    async fn get(&self, reference: &str) -> Result<Option<ReferenceValidation>> {
        Ok(self.entries.lock().await.get(reference).cloned())
    }

    async fn put(&self, entry: &ReferenceValidation) -> Result<()> {
        self.insert(entry.clone()).await;
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        Ok((before - entries.len()) as u64)
    }
}

/// [`Publisher`] that keeps published studies in memory.
#[derive(Default)]
pub struct MemoryPublisher {
    studies: Mutex<Vec<(Uuid, PublishedStudy)>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<(Uuid, PublishedStudy)> {
        self.studies.lock().await.clone()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, study: &PublishedStudy) -> Result<Uuid> {
        let mut studies = self.studies.lock().await;
        if studies.iter().any(|(_, s)| s.run_id == study.run_id) {
            bail!("run {} has already been published", study.run_id);
        }
        let id = Uuid::new_v4();
        studies.push((id, study.clone()));
        Ok(id)
    }
}
