use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::app::AppState;
use crate::error::ApiError;
use crate::jobs::{JobFilter, JobPage, JobStats, JobStatus, JobType};
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    /// Job type; optional on the type-scoped routes
    #[serde(rename = "type", default)]
    pub job_type: Option<String>,
    #[serde(default)]
    pub business_id: Option<String>,
    /// Everything else is handed to the executor as the job payload
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub business_id: String,
    pub created_at: DateTime<Utc>,
    pub status_url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub business_id: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    /// Kept as strings so bad numbers produce a JSON validation error
    pub limit: Option<String>,
    pub offset: Option<String>,
}

/// POST /api/jobs - Submit a job of the type named in the body
#[tracing::instrument(skip(state, payload))]
pub async fn post(
    State(state): State<AppState>,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> ApiResult<JobAccepted> {
    create(&state, None, payload).await
}

/// POST /api/{reports,governance,transformations,catalogs}/jobs
#[tracing::instrument(skip(state, payload))]
pub async fn post_scoped(
    job_type: JobType,
    State(state): State<AppState>,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> ApiResult<JobAccepted> {
    create(&state, Some(job_type), payload).await
}

/// GET /api/jobs - List jobs, filtered then paginated
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<JobPage> {
    list_filtered(&state, None, query).await
}

/// GET /api/{reports,governance,transformations,catalogs}/jobs
#[tracing::instrument(skip(state))]
pub async fn list_scoped(
    job_type: JobType,
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<JobPage> {
    list_filtered(&state, Some(job_type), query).await
}

/// GET /api/jobs/stats - Dashboard counts by status and type
#[tracing::instrument(skip(state))]
pub async fn stats(State(state): State<AppState>) -> ApiResult<JobStats> {
    Ok(ApiResponse::success(state.jobs.stats().await))
}

async fn create(
    state: &AppState,
    scoped: Option<JobType>,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> ApiResult<JobAccepted> {
    let Json(request) = payload.map_err(|e| ApiError::invalid_json(e.body_text()))?;

    let requested = request
        .job_type
        .as_deref()
        .map(|t| t.parse::<JobType>().map_err(|e| ApiError::invalid_field("type", e)))
        .transpose()?;

    let job_type = match (scoped, requested) {
        (Some(scoped), Some(requested)) if scoped != requested => {
            return Err(ApiError::invalid_field(
                "type",
                format!("{} does not match this endpoint ({})", requested, scoped),
            ));
        }
        (Some(scoped), _) => scoped,
        (None, Some(requested)) => requested,
        (None, None) => return Err(ApiError::from(crate::jobs::JobError::missing_field("type"))),
    };

    let business_id = request.business_id.unwrap_or_default();
    let job = state
        .jobs
        .create_job(&business_id, job_type, Value::Object(request.params))
        .await?;

    Ok(ApiResponse::accepted(JobAccepted {
        status_url: format!("/api/jobs/{}", job.id),
        job_id: job.id.to_string(),
        status: job.status,
        job_type: job.job_type,
        business_id: job.owner_id,
        created_at: job.created_at,
    }))
}

async fn list_filtered(
    state: &AppState,
    scoped: Option<JobType>,
    query: ListJobsQuery,
) -> ApiResult<JobPage> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<JobStatus>().map_err(|e| ApiError::invalid_field("status", e)))
        .transpose()?;

    let requested = query
        .job_type
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|t| t.parse::<JobType>().map_err(|e| ApiError::invalid_field("type", e)))
        .transpose()?;

    let filter = JobFilter {
        owner_id: query.business_id.filter(|b| !b.trim().is_empty()),
        status,
        job_type: scoped.or(requested),
    };

    let limit = parse_count("limit", query.limit.as_deref())?;
    let offset = parse_count("offset", query.offset.as_deref())?;

    let page = state.jobs.list_jobs(&filter, limit, offset).await;
    Ok(ApiResponse::success(page))
}

fn parse_count(field: &str, raw: Option<&str>) -> Result<Option<usize>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ApiError::invalid_field(field, format!("expected a non-negative integer, got '{}'", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_collects_remaining_fields_as_params() {
        let request: CreateJobRequest = serde_json::from_value(serde_json::json!({
            "type": "report",
            "business_id": "biz-1",
            "report_type": "risk_assessment",
            "format": "csv"
        }))
        .unwrap();
        assert_eq!(request.job_type.as_deref(), Some("report"));
        assert_eq!(request.business_id.as_deref(), Some("biz-1"));
        assert_eq!(request.params.len(), 2);
        assert_eq!(request.params["format"], "csv");
    }

    #[test]
    fn counts_must_be_non_negative_integers() {
        assert_eq!(parse_count("limit", None).unwrap(), None);
        assert_eq!(parse_count("limit", Some(" 25 ")).unwrap(), Some(25));
        assert!(parse_count("offset", Some("-1")).is_err());
        assert!(parse_count("offset", Some("ten")).is_err());
    }
}
