//! `lectio serve`: HTTP API over the run service.

use std::net::SocketAddr;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use lectio_core::request::NewGenerationRequest;
use lectio_core::{PipelineError, RunService};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::ResultNotReady { .. } | PipelineError::AlreadyFinished { .. } => StatusCode::CONFLICT,
            PipelineError::RunFailed { .. } | PipelineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        Self {
            status,
            message: format!("{err:#}"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct RunCreatedResponse {
    pub run_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub run_id: Uuid,
    pub status: &'static str,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(service: RunService) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/runs", get(list_runs).post(create_run))
        .route("/api/runs/{id}", get(get_run))
        .route("/api/runs/{id}/cancel", post(cancel_run))
        .route("/api/runs/{id}/result", get(get_result))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(service: RunService, bind: &str, port: u16) -> Result<()> {
    let app = build_router(service.clone());
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("lectio serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    service.cancel_all().await;
    tracing::info!("lectio serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C; shutting down");
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index(State(service): State<RunService>) -> Result<axum::response::Response, AppError> {
    let runs = service.list_runs().await?;

    let rows = if runs.is_empty() {
        "<tr><td colspan=\"4\">No runs found.</td></tr>".to_string()
    } else {
        runs.iter()
            .map(|r| {
                format!(
                    "<tr><td><a href=\"/api/runs/{id}\">{id}</a></td><td>{status}</td><td>{phase}</td><td>{progress}%</td></tr>",
                    id = r.id,
                    status = r.status,
                    phase = r.phase,
                    progress = r.progress,
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let html = format!(
        "<!DOCTYPE html>\
<html><head><title>lectio</title></head><body>\
<h1>lectio</h1>\
<p><a href=\"/api/runs\">/api/runs</a></p>\
<table><tr><th>Run</th><th>Status</th><th>Phase</th><th>Progress</th></tr>{rows}</table>\
</body></html>"
    );

    Ok(Html(html).into_response())
}

async fn create_run(
    State(service): State<RunService>,
    Json(request): Json<NewGenerationRequest>,
) -> Result<axum::response::Response, AppError> {
    let run_id = service.start_run(request).await?;
    Ok((StatusCode::CREATED, Json(RunCreatedResponse { run_id })).into_response())
}

async fn list_runs(State(service): State<RunService>) -> Result<axum::response::Response, AppError> {
    let runs = service.list_runs().await?;
    Ok(Json(runs).into_response())
}

async fn get_run(
    State(service): State<RunService>,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    let snapshot = service.get_run_status(id).await?;
    Ok(Json(snapshot).into_response())
}

async fn cancel_run(
    State(service): State<RunService>,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    service.cancel_run(id).await?;
    let body = CancelResponse {
        run_id: id,
        status: "cancelled",
    };
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

async fn get_result(
    State(service): State<RunService>,
    Path(id): Path<Uuid>,
) -> Result<axum::response::Response, AppError> {
    let result = service.get_result(id).await?;
    Ok(Json(result).into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
