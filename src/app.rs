use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::HeaderValue,
    routing::get,
    Json, Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::handlers::{self, jobs::collection};
use crate::jobs::{JobService, JobStore, JobType};
use crate::services::{standard_registry, MetricsSource};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobService>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(jobs: Arc<JobService>, config: Arc<AppConfig>) -> Self {
        Self { jobs, config }
    }

    /// Fresh store plus the standard executors, configured from `config.jobs`
    pub fn build(config: AppConfig, metrics: Arc<dyn MetricsSource>) -> Self {
        let store = Arc::new(JobStore::new());
        let service = JobService::new(store, standard_registry(metrics), config.jobs.service_config());
        Self::new(Arc::new(service), Arc::new(config))
    }
}

pub fn router(state: AppState) -> Router {
    let config = state.config.clone();

    let mut app = Router::new()
        // Public
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        // Jobs
        .merge(job_routes())
        // One collection per job kind
        .nest("/api/reports", kind_routes(JobType::ReportGeneration))
        .nest("/api/governance", kind_routes(JobType::GovernanceAssessment))
        .nest("/api/transformations", kind_routes(JobType::DataTransformation))
        .nest("/api/catalogs", kind_routes(JobType::CatalogCreation))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(config.api.max_request_size_bytes));

    if config.api.enable_request_logging {
        app = app.layer(TraceLayer::new_for_http());
    }

    if config.security.enable_cors {
        app = app.layer(cors_layer(&config.security.cors_origins));
    }

    app
}

fn job_routes() -> Router<AppState> {
    use axum::routing::post;

    Router::new()
        .route("/api/jobs", post(handlers::jobs_post).get(handlers::jobs_list))
        // Static segments win over :id
        .route("/api/jobs/status", get(handlers::job_status))
        .route("/api/jobs/stats", get(handlers::jobs_stats))
        .route("/api/jobs/:id", get(handlers::job_get).delete(handlers::job_delete))
}

fn kind_routes(job_type: JobType) -> Router<AppState> {
    use axum::routing::post;

    Router::new().route(
        "/jobs",
        post(
            move |state: State<AppState>, payload: Result<Json<collection::CreateJobRequest>, JsonRejection>| {
                collection::post_scoped(job_type, state, payload)
            },
        )
        .get(move |state: State<AppState>, query: Query<collection::ListJobsQuery>| {
            collection::list_scoped(job_type, state, query)
        }),
    )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
