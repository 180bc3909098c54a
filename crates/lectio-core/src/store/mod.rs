//! Persistence and publication collaborators.
//!
//! The pipeline talks to storage only through these traits. Each has a
//! PostgreSQL implementation backed by `lectio-db` and an in-memory one for
//! tests and dry runs.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lectio_db::models::{
    ArtifactKind, ContentStyle, GenerationRequest, PhaseTransition, ReferenceValidation, RunStatus,
    WorkflowPhase, WorkflowRun,
};

pub use memory::{MemoryPublisher, MemoryReferenceCache, MemoryRunStore};
pub use postgres::{PgPublisher, PgReferenceCache, PgRunStore};

/// A change to a run's state, persisted together with a history entry.
#[derive(Debug, Clone, PartialEq)]
pub enum RunUpdate {
    /// Enter `phase`. Progress is clamped so it never decreases.
    Advance {
        phase: WorkflowPhase,
        status: RunStatus,
        progress: i32,
        message: Option<String>,
    },
    /// Freeze the run in `failed`, keeping its last progress.
    Fail {
        failed_phase: WorkflowPhase,
        message: String,
    },
}

/// Durable run state: requests, runs, phase history and checkpoints.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Persist a request together with a fresh `pending` run.
    async fn create_run(&self, request: &GenerationRequest) -> Result<WorkflowRun>;

    async fn get_request(&self, request_id: Uuid) -> Result<Option<GenerationRequest>>;

    async fn get_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>>;

    /// All runs, newest first.
    async fn list_runs(&self) -> Result<Vec<WorkflowRun>>;

    /// Apply `update` and append it to the phase history.
    ///
    /// Returns `false` without writing anything if the run is no longer
    /// active (cancelled or already finished).
    async fn record_transition(&self, run_id: Uuid, update: &RunUpdate) -> Result<bool>;

    /// Mark an active run cancelled. Returns `false` if it was not active.
    async fn cancel_run(&self, run_id: Uuid) -> Result<bool>;

    /// Phase history in the order it was recorded.
    async fn phase_history(&self, run_id: Uuid) -> Result<Vec<PhaseTransition>>;

    async fn save_artifact(&self, run_id: Uuid, kind: ArtifactKind, payload: &serde_json::Value) -> Result<()>;

    async fn load_artifact(&self, run_id: Uuid, kind: ArtifactKind) -> Result<Option<serde_json::Value>>;
}

/// TTL key-value store for reference validations, shared across runs.
///
/// Writes are last-writer-wins; no locking is needed because a stale read
/// only costs an extra refresh.
#[async_trait]
pub trait ReferenceCache: Send + Sync {
    async fn get(&self, reference: &str) -> Result<Option<ReferenceValidation>>;

    async fn put(&self, entry: &ReferenceValidation) -> Result<()>;

    /// Delete entries that expired at or before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// A finalized study ready for durable storage outside the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedStudy {
    pub run_id: Uuid,
    pub owner_id: String,
    pub title: String,
    pub theme: Option<String>,
    pub description: Option<String>,
    pub style: ContentStyle,
    pub duration_days: i32,
    pub metadata: serde_json::Value,
    pub days: Vec<PublishedDay>,
}

/// One day document, in day order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedDay {
    pub day_number: i32,
    pub title: String,
    pub is_fallback: bool,
    pub content: serde_json::Value,
}

/// Content publication collaborator.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Store the study and return its id.
    async fn publish(&self, study: &PublishedStudy) -> Result<Uuid>;
}

// Compile-time check: the collaborator traits must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn RunStore, _: &dyn ReferenceCache, _: &dyn Publisher) {}
};
