use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use super::error::ExecutionError;
use super::executor::{JobContext, JobExecutor, StepTracker};
use super::record::{JobId, JobRecord, JobStatus, JobType};
use super::store::JobStore;

/// Drives one job from pending to a terminal state. Exactly one runner
/// exists per job.
pub struct JobRunner {
    job_id: JobId,
    job_type: JobType,
    context: JobContext,
    executor: Arc<dyn JobExecutor>,
    store: Arc<JobStore>,
    cancel: CancellationToken,
    pacing: Duration,
}

impl JobRunner {
    pub fn new(
        record: &JobRecord,
        executor: Arc<dyn JobExecutor>,
        store: Arc<JobStore>,
        cancel: CancellationToken,
        pacing: Duration,
    ) -> Self {
        Self {
            job_id: record.id.clone(),
            job_type: record.job_type,
            context: JobContext {
                job_id: record.id.clone(),
                owner_id: record.owner_id.clone(),
                payload: record.payload.clone(),
            },
            executor,
            store,
            cancel,
            pacing,
        }
    }

    /// Run to completion and return the status the job ended in.
    pub async fn run(self) -> Option<JobStatus> {
        let span = tracing::info_span!(
            "job",
            job_id = %self.job_id,
            job_type = %self.job_type,
            business_id = %self.context.owner_id,
        );
        self.execute().instrument(span).await
    }

    async fn execute(self) -> Option<JobStatus> {
        match self.store.update(&self.job_id, |r| r.start()).await {
            Some(Ok(())) => info!("Job started"),
            Some(Err(e)) => {
                // Cancelled before the runner got scheduled
                debug!(reason = %e, "Job not started");
                return self.final_status().await;
            }
            None => {
                warn!("Job disappeared before it could start");
                return None;
            }
        }

        let mut tracker = StepTracker::new(
            self.job_id.clone(),
            self.store.clone(),
            self.executor.steps(),
            self.cancel.clone(),
            self.pacing,
        );

        // A panicking executor still has to leave the job in a terminal state
        let work = AssertUnwindSafe(self.executor.execute(&self.context, &mut tracker)).catch_unwind();
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ExecutionError::Cancelled),
            res = work => res.unwrap_or_else(|panic| {
                Err(ExecutionError::Panicked(panic_message(panic.as_ref()).to_string()))
            }),
        };

        match outcome {
            Ok(result) => {
                match self.store.update(&self.job_id, |r| r.complete(result)).await {
                    Some(Ok(())) => info!("Job completed"),
                    Some(Err(e)) => debug!(reason = %e, "Job finished after leaving processing"),
                    None => warn!("Job evicted before completion was recorded"),
                }
            }
            Err(ExecutionError::Cancelled) => {
                // CancelJob already recorded the transition; shutdown did not
                if let Some(Ok(())) = self.store.update(&self.job_id, |r| r.cancel()).await {
                    info!("Job cancelled during shutdown");
                } else {
                    info!("Job cancelled");
                }
            }
            Err(e) => {
                let message = e.to_string();
                error!(error = %message, step = ?tracker.current(), "Job failed");
                match self.store.update(&self.job_id, |r| r.fail(message)).await {
                    Some(Ok(())) => {}
                    Some(Err(e)) => debug!(reason = %e, "Job failure not recorded"),
                    None => warn!("Job evicted before failure was recorded"),
                }
            }
        }

        self.final_status().await
    }

    async fn final_status(&self) -> Option<JobStatus> {
        self.store.get(&self.job_id).await.map(|r| r.status)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::executor::JobStep;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    const STEPS: &[JobStep] = &[
        JobStep { name: "first", description: "First step" },
        JobStep { name: "second", description: "Second step" },
        JobStep { name: "third", description: "Third step" },
    ];

    /// Walks the steps and fails on `fail_at` when set
    struct Scripted {
        fail_at: Option<&'static str>,
    }

    #[async_trait]
    impl JobExecutor for Scripted {
        fn job_type(&self) -> JobType {
            JobType::ReportGeneration
        }

        fn required_fields(&self) -> &'static [&'static str] {
            &[]
        }

        fn steps(&self) -> &'static [JobStep] {
            STEPS
        }

        async fn execute(&self, _ctx: &JobContext, steps: &mut StepTracker) -> Result<Value, ExecutionError> {
            for step in STEPS {
                steps.enter(step.name).await?;
                if self.fail_at == Some(step.name) {
                    return Err(ExecutionError::step(step.name, "boom"));
                }
            }
            Ok(json!({"done": true}))
        }
    }

    /// Enters the first step, then panics
    struct Panicking;

    #[async_trait]
    impl JobExecutor for Panicking {
        fn job_type(&self) -> JobType {
            JobType::ReportGeneration
        }

        fn required_fields(&self) -> &'static [&'static str] {
            &[]
        }

        fn steps(&self) -> &'static [JobStep] {
            STEPS
        }

        async fn execute(&self, _ctx: &JobContext, steps: &mut StepTracker) -> Result<Value, ExecutionError> {
            steps.enter("first").await?;
            let checks: Vec<u32> = Vec::new();
            Ok(json!({"first": checks[0]}))
        }
    }

    async fn setup(fail_at: Option<&'static str>) -> (Arc<JobStore>, JobRunner, JobId, CancellationToken) {
        let store = Arc::new(JobStore::new());
        let record = JobRecord::new("biz-1", JobType::ReportGeneration, json!({}), STEPS.len());
        let id = record.id.clone();
        store.put(record.clone()).await;
        let token = CancellationToken::new();
        let runner = JobRunner::new(
            &record,
            Arc::new(Scripted { fail_at }),
            store.clone(),
            token.clone(),
            Duration::ZERO,
        );
        (store, runner, id, token)
    }

    #[tokio::test]
    async fn successful_run_completes_with_result() {
        let (store, runner, id, _) = setup(None).await;
        assert_eq!(runner.run().await, Some(JobStatus::Completed));

        let job = store.get(&id).await.unwrap();
        assert_eq!(job.progress, 1.0);
        assert_eq!(job.current_step, 3);
        assert_eq!(job.result, Some(json!({"done": true})));
        assert!(job.error.is_none());
        assert!(job.started_at.is_some() && job.completed_at.is_some());
    }

    #[tokio::test]
    async fn failing_step_records_error_and_stops_progress() {
        let (store, runner, id, _) = setup(Some("second")).await;
        assert_eq!(runner.run().await, Some(JobStatus::Failed));

        let job = store.get(&id).await.unwrap();
        assert_eq!(job.current_step, 2);
        assert!((job.progress - 1.0 / 3.0).abs() < f64::EPSILON);
        assert!(job.result.is_none());
        assert_eq!(job.error.as_deref(), Some("second failed: boom"));
    }

    #[tokio::test]
    async fn panicking_executor_marks_job_failed() {
        let store = Arc::new(JobStore::new());
        let record = JobRecord::new("biz-1", JobType::ReportGeneration, json!({}), STEPS.len());
        let id = record.id.clone();
        store.put(record.clone()).await;
        let runner = JobRunner::new(
            &record,
            Arc::new(Panicking),
            store.clone(),
            CancellationToken::new(),
            Duration::ZERO,
        );

        assert_eq!(runner.run().await, Some(JobStatus::Failed));
        let job = store.get(&id).await.unwrap();
        assert_eq!(job.current_step, 1);
        assert!(job.progress < 1.0);
        assert!(job.result.is_none());
        let error = job.error.unwrap();
        assert!(error.contains("executor panicked"), "error: {}", error);
        assert!(error.contains("index out of bounds"), "error: {}", error);
    }

    #[tokio::test]
    async fn pre_cancelled_token_ends_cancelled() {
        let (store, runner, id, token) = setup(None).await;
        token.cancel();
        assert_eq!(runner.run().await, Some(JobStatus::Cancelled));
        let job = store.get(&id).await.unwrap();
        assert!(job.result.is_none() && job.error.is_none());
    }

    #[tokio::test]
    async fn runner_does_not_restart_a_cancelled_job() {
        let (store, runner, id, _) = setup(None).await;
        store.update(&id, |r| r.cancel()).await;
        assert_eq!(runner.run().await, Some(JobStatus::Cancelled));
        assert!(store.get(&id).await.unwrap().started_at.is_none());
    }
}
