//! Job API Handlers
//!
//! HTTP endpoints for job lifecycle management.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use spore_core::domain::job::{JobId, JobSnapshot};
use spore_core::dto::job::JobCreated;
use spore_core::tools::JobRequest;

use crate::api::error::{ApiError, ApiResult};
use crate::service::JobRegistry;

/// POST /jobs
/// Validate a tool request and start its process
pub async fn submit_job(
    State(registry): State<JobRegistry>,
    body: Result<Json<JobRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<JobCreated>)> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    tracing::info!("Submitting {} job", request.tool());

    let job_id = registry.submit_request(&request)?;

    Ok((StatusCode::ACCEPTED, Json(JobCreated { job_id })))
}

/// GET /jobs
pub async fn list_jobs(State(registry): State<JobRegistry>) -> Json<Vec<JobSnapshot>> {
    tracing::debug!("Listing jobs");
    Json(registry.list())
}

/// GET /jobs/{id}
pub async fn get_job(
    State(registry): State<JobRegistry>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<JobSnapshot>> {
    tracing::debug!("Getting job: {}", id);
    Ok(Json(registry.get_status(id)?))
}

/// POST /jobs/{id}/cancel
/// Kill the job's process tree and return its settled state
pub async fn cancel_job(
    State(registry): State<JobRegistry>,
    Path(id): Path<JobId>,
) -> ApiResult<Json<JobSnapshot>> {
    tracing::info!("Cancelling job: {}", id);
    Ok(Json(registry.cancel(id).await?))
}
