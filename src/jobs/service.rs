use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::error::JobError;
use super::executor::ExecutorRegistry;
use super::record::{JobId, JobRecord, JobType};
use super::runner::JobRunner;
use super::store::{JobFilter, JobStats, JobStore, RetentionPolicy};

/// Tunables for the job API
#[derive(Debug, Clone, PartialEq)]
pub struct JobServiceConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Delay inserted before each step; zero disables it
    pub step_pacing: Duration,
    pub retention: RetentionPolicy,
}

impl Default for JobServiceConfig {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 500,
            step_pacing: Duration::ZERO,
            retention: RetentionPolicy::default(),
        }
    }
}

/// One page of a filtered job listing
#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub jobs: Vec<JobRecord>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

/// Boundary used by the HTTP handlers: create, query and cancel jobs.
///
/// Every runner is spawned on the service's task tracker with a child of
/// the root cancellation token, so `shutdown` can stop all of them.
pub struct JobService {
    store: Arc<JobStore>,
    executors: ExecutorRegistry,
    config: JobServiceConfig,
    root: CancellationToken,
    tracker: TaskTracker,
    tokens: Arc<RwLock<HashMap<JobId, CancellationToken>>>,
}

impl JobService {
    pub fn new(store: Arc<JobStore>, executors: ExecutorRegistry, config: JobServiceConfig) -> Self {
        Self {
            store,
            executors,
            config,
            root: CancellationToken::new(),
            tracker: TaskTracker::new(),
            tokens: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn config(&self) -> &JobServiceConfig {
        &self.config
    }

    pub fn job_types(&self) -> Vec<JobType> {
        self.executors.job_types()
    }

    /// Validate, record as pending, and schedule the runner. Returns the
    /// pending snapshot without waiting for any step.
    pub async fn create_job(
        &self,
        owner_id: &str,
        job_type: JobType,
        payload: Value,
    ) -> Result<JobRecord, JobError> {
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            return Err(JobError::missing_field("business_id"));
        }

        let executor = self
            .executors
            .get(job_type)
            .ok_or(JobError::UnsupportedType(job_type))?;
        validate_required(&payload, executor.required_fields())?;

        if self.is_shutting_down() {
            return Err(JobError::Unavailable("job service is shutting down".to_string()));
        }

        let record = JobRecord::new(owner_id, job_type, payload, executor.steps().len());
        let id = record.id.clone();
        self.store.put(record.clone()).await;

        let token = self.root.child_token();
        self.tokens.write().await.insert(id.clone(), token.clone());

        if self.is_shutting_down() {
            // Lost the race with shutdown; leave nothing behind without a runner
            self.store.remove(&id).await;
            self.tokens.write().await.remove(&id);
            return Err(JobError::Unavailable("job service is shutting down".to_string()));
        }

        let runner = JobRunner::new(
            &record,
            executor,
            self.store.clone(),
            token,
            self.config.step_pacing,
        );
        let tokens = self.tokens.clone();
        let cleanup_id = id.clone();
        self.tracker.spawn(async move {
            if let Err(panic) = AssertUnwindSafe(runner.run()).catch_unwind().await {
                error!(job_id = %cleanup_id, ?panic, "Job runner panicked");
            }
            tokens.write().await.remove(&cleanup_id);
        });

        if let Some(max_retained) = self.config.retention.max_retained {
            let cap = RetentionPolicy {
                ttl: None,
                max_retained: Some(max_retained),
            };
            self.store.sweep(&cap, Utc::now()).await;
        }

        info!(job_id = %id, job_type = %job_type, business_id = %owner_id, "Job created");
        Ok(record)
    }

    pub async fn get_job(&self, id: &JobId) -> Result<JobRecord, JobError> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    /// Filter first, then page. `limit` falls back to the default page size
    /// and is clamped to `1..=max_page_size`.
    pub async fn list_jobs(
        &self,
        filter: &JobFilter,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> JobPage {
        let limit = limit
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size.max(1));
        let offset = offset.unwrap_or(0);

        let matched = self.store.list(filter).await;
        let total = matched.len();
        let jobs: Vec<JobRecord> = matched.into_iter().skip(offset).take(limit).collect();
        let has_more = offset.saturating_add(jobs.len()) < total;

        JobPage {
            jobs,
            total,
            limit,
            offset,
            has_more,
        }
    }

    /// Stop a pending or processing job. Terminal jobs are rejected.
    pub async fn cancel_job(&self, id: &JobId) -> Result<JobRecord, JobError> {
        let snapshot = self
            .store
            .update(id, |r| r.cancel().map(|_| r.clone()))
            .await
            .ok_or_else(|| JobError::NotFound(id.to_string()))??;

        if let Some(token) = self.tokens.read().await.get(id) {
            token.cancel();
        }
        info!(job_id = %id, "Job cancellation requested");
        Ok(snapshot)
    }

    pub async fn stats(&self) -> JobStats {
        self.store.stats().await
    }

    /// Apply the configured retention policy once
    pub async fn sweep_expired(&self) -> usize {
        self.store.sweep(&self.config.retention, Utc::now()).await
    }

    /// Periodically sweep until shutdown. No-op without a retention policy.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) {
        if !self.config.retention.is_enabled() {
            debug!("No retention policy configured; sweeper not started");
            return;
        }
        if interval.is_zero() {
            warn!("Sweep interval is zero; sweeper not started");
            return;
        }

        let service = Arc::clone(self);
        let root = self.root.clone();
        self.tracker.spawn(async move {
            // First sweep one interval after start, not immediately
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    _ = root.cancelled() => break,
                    _ = ticker.tick() => {
                        service.sweep_expired().await;
                    }
                }
            }
            debug!("Retention sweeper stopped");
        });
    }

    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled() || self.tracker.is_closed()
    }

    /// Cancel every outstanding runner and wait for them to finish
    pub async fn shutdown(&self) {
        info!(outstanding = self.tracker.len(), "Shutting down job runners");
        self.root.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Job runners stopped");
    }
}

/// Required fields must be present, non-null, and not blank strings
fn validate_required(payload: &Value, required: &[&str]) -> Result<(), JobError> {
    let Some(object) = payload.as_object() else {
        return Err(JobError::validation(
            "Request parameters must be a JSON object",
            HashMap::new(),
        ));
    };

    let mut field_errors = HashMap::new();
    for field in required {
        let present = match object.get(*field) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        };
        if !present {
            field_errors.insert(field.to_string(), "This field is required".to_string());
        }
    }

    if field_errors.is_empty() {
        Ok(())
    } else {
        Err(JobError::validation("Missing required fields", field_errors))
    }
}
