//! Route handlers for the ingestion entry points

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

use revstream_common::types::{Platform, StorageProvider};

use crate::error::{AppError, AppResult};
use crate::ingest::{
    IngestOrchestrator, IngestRequest, JobFilter, JobStatus, StartOutcome,
};

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub orchestrator: Arc<IngestOrchestrator>,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/processing/start", post(start_processing))
        .route("/api/v1/jobs", get(list_jobs))
        .route("/api/v1/jobs/:job_id", get(get_job))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartProcessingRequest {
    filepath: String,
    platform: Platform,
    storage_provider: StorageProvider,
    #[serde(default = "default_store_to_database")]
    store_to_database: bool,
}

fn default_store_to_database() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ListJobsParams {
    status: Option<String>,
    platform: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> Result<Response, StatusCode> {
    match crate::db::health_check(&state.db).await {
        Ok(()) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response()),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        },
    }
}

/// Start ingesting a file in the background
///
/// POST /api/v1/processing/start
///
/// Responds immediately with the job id and current status; poll the job
/// endpoint to observe completion.
async fn start_processing(
    State(state): State<AppState>,
    Json(body): Json<StartProcessingRequest>,
) -> Response {
    let request = IngestRequest {
        filepath: body.filepath,
        platform: body.platform,
        storage_provider: body.storage_provider,
        store_to_database: body.store_to_database,
    };

    match state.orchestrator.start_file_processing(request).await {
        StartOutcome::Started { job_id, handle } => {
            // The task records its own outcome on the job row; the handle is
            // only needed by callers that want to await completion in-process.
            drop(handle);
            (
                StatusCode::ACCEPTED,
                Json(json!({
                    "jobId": job_id,
                    "status": JobStatus::Processing.as_str(),
                })),
            )
                .into_response()
        }
        StartOutcome::Skipped(outcome) => {
            let status = match outcome.status {
                crate::ingest::IngestStatus::AlreadyProcessed => StatusCode::OK,
                _ => StatusCode::CONFLICT,
            };
            (
                status,
                Json(json!({
                    "jobId": outcome.job_id,
                    "status": outcome.status,
                    "stats": outcome.stats,
                    "error": outcome.error,
                })),
            )
                .into_response()
        }
    }
}

/// Get a specific job by ID
///
/// GET /api/v1/jobs/:job_id
async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Response> {
    let job = state
        .orchestrator
        .jobs()
        .get_job(&job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job '{}' not found", job_id)))?;

    Ok((StatusCode::OK, Json(json!(job))).into_response())
}

/// List jobs with optional filters
///
/// GET /api/v1/jobs?status=completed&platform=agoda&limit=20&offset=0
async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsParams>,
) -> AppResult<Response> {
    let filter = JobFilter {
        status: params.status,
        platform: params.platform,
    };

    let jobs = state
        .orchestrator
        .jobs()
        .list_jobs(&filter, params.limit.unwrap_or(20), params.offset.unwrap_or(0))
        .await?;

    Ok((StatusCode::OK, Json(json!({ "jobs": jobs }))).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_request_deserializes_camel_case() {
        let body: StartProcessingRequest = serde_json::from_str(
            r#"{"filepath":"reviews/agoda_com-batch7.jl","platform":"agoda","storageProvider":"s3"}"#,
        )
        .unwrap();

        assert_eq!(body.platform, Platform::Agoda);
        assert_eq!(body.storage_provider, StorageProvider::S3);
        assert!(body.store_to_database);
    }
}
