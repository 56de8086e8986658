use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::{ExecutionError, TransitionError};
use super::record::{JobId, JobStatus, JobType};
use super::store::JobStore;

/// One named stage of a job's pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobStep {
    pub name: &'static str,
    pub description: &'static str,
}

/// Read-only view of the job handed to an executor
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub owner_id: String,
    pub payload: Value,
}

impl JobContext {
    pub fn str_param(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(Value::as_str)
    }

    pub fn array_param(&self, field: &str) -> Option<&Vec<Value>> {
        self.payload.get(field).and_then(Value::as_array)
    }
}

/// Business logic for one job type.
///
/// `execute` must announce each entry of `steps()` through the tracker, in
/// order, before doing that step's work.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    fn job_type(&self) -> JobType;

    /// Payload fields that must be present for a job to be accepted
    fn required_fields(&self) -> &'static [&'static str];

    fn steps(&self) -> &'static [JobStep];

    async fn execute(
        &self,
        ctx: &JobContext,
        steps: &mut StepTracker,
    ) -> Result<Value, ExecutionError>;
}

/// Executors keyed by the job type they handle
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<JobType, Arc<dyn JobExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, executor: Arc<dyn JobExecutor>) -> &mut Self {
        self.executors.insert(executor.job_type(), executor);
        self
    }

    pub fn with(mut self, executor: Arc<dyn JobExecutor>) -> Self {
        self.register(executor);
        self
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobExecutor>> {
        self.executors.get(&job_type).cloned()
    }

    pub fn job_types(&self) -> Vec<JobType> {
        let mut types: Vec<JobType> = self.executors.keys().copied().collect();
        types.sort();
        types
    }
}

/// Advances the job cursor as an executor moves through its steps
pub struct StepTracker {
    job_id: JobId,
    store: Arc<JobStore>,
    steps: &'static [JobStep],
    cancel: CancellationToken,
    pacing: Duration,
    current: Option<&'static str>,
}

impl StepTracker {
    pub fn new(
        job_id: JobId,
        store: Arc<JobStore>,
        steps: &'static [JobStep],
        cancel: CancellationToken,
        pacing: Duration,
    ) -> Self {
        Self {
            job_id,
            store,
            steps,
            cancel,
            pacing,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&'static str> {
        self.current
    }

    /// Mark step `name` as the one now running.
    pub async fn enter(&mut self, name: &'static str) -> Result<(), ExecutionError> {
        if self.cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }

        let position = self
            .steps
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| ExecutionError::Internal(format!("unknown step '{}'", name)))?;
        let step = self.steps[position];

        if !self.pacing.is_zero() {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(ExecutionError::Cancelled),
                _ = tokio::time::sleep(self.pacing) => {}
            }
        }

        let outcome = self
            .store
            .update(&self.job_id, |r| r.enter_step(position + 1, step.description))
            .await;

        match outcome {
            Some(Ok(())) => {
                debug!(step = step.name, index = position + 1, "Job step entered");
                self.current = Some(step.name);
                Ok(())
            }
            Some(Err(TransitionError::NotProcessing(JobStatus::Cancelled))) => {
                Err(ExecutionError::Cancelled)
            }
            Some(Err(e)) => Err(ExecutionError::Internal(e.to_string())),
            None => Err(ExecutionError::Internal(format!(
                "job {} no longer in store",
                self.job_id
            ))),
        }
    }
}
