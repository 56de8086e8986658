use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::jobs::{JobId, JobRecord};
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct JobStatusQuery {
    pub job_id: Option<String>,
}

/// GET /api/jobs/:id - Full job record, including result or error once terminal
#[tracing::instrument(skip(state))]
pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<JobRecord> {
    let job = state.jobs.get_job(&JobId::from(id)).await?;
    Ok(ApiResponse::success(job))
}

/// GET /api/jobs/status?job_id= - Same as `get`, for clients that poll by query
#[tracing::instrument(skip(state))]
pub async fn status(
    State(state): State<AppState>,
    Query(query): Query<JobStatusQuery>,
) -> ApiResult<JobRecord> {
    let id = query
        .job_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::invalid_field("job_id", "This field is required"))?;

    let job = state.jobs.get_job(&JobId::from(id)).await?;
    Ok(ApiResponse::success(job))
}

/// DELETE /api/jobs/:id - Cancel a pending or processing job
#[tracing::instrument(skip(state))]
pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<JobRecord> {
    let job = state.jobs.cancel_job(&JobId::from(id)).await?;
    Ok(ApiResponse::success(job))
}
