use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// GET / - Service banner and endpoint map
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");
    let job_types: Vec<&str> = state.jobs.job_types().iter().map(|t| t.as_str()).collect();

    Json(json!({
        "success": true,
        "data": {
            "name": "KYB Jobs API",
            "version": version,
            "description": "Background report, governance, transformation and catalog jobs",
            "job_types": job_types,
            "endpoints": {
                "home": "/",
                "health": "/health",
                "jobs": "/api/jobs (POST submit, GET list)",
                "job": "/api/jobs/:id (GET status, DELETE cancel)",
                "job_status": "/api/jobs/status?job_id=",
                "stats": "/api/jobs/stats",
                "reports": "/api/reports/jobs",
                "governance": "/api/governance/jobs",
                "transformations": "/api/transformations/jobs",
                "catalogs": "/api/catalogs/jobs",
            }
        }
    }))
}

/// GET /health - Liveness plus job counts; 503 once shutdown has begun
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let stats = state.jobs.stats().await;

    if state.jobs.is_shutting_down() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "shutting down",
                "data": {
                    "status": "draining",
                    "timestamp": now,
                    "jobs": { "active": stats.active, "total": stats.total }
                }
            })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "data": {
                "status": "ok",
                "timestamp": now,
                "jobs": { "active": stats.active, "total": stats.total }
            }
        })),
    )
}
