use std::collections::HashMap;
use thiserror::Error;

use super::record::{JobStatus, JobType};

/// Rejected state machine transition on a job record
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransitionError {
    #[error("cannot move job from {from} to {to}")]
    Invalid { from: JobStatus, to: JobStatus },

    #[error("job is {0}, steps can only advance while processing")]
    NotProcessing(JobStatus),

    #[error("step {requested} out of order (current {current}, total {total})")]
    StepOutOfOrder {
        current: usize,
        requested: usize,
        total: usize,
    },
}

/// Errors surfaced synchronously by the job API
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field_errors: HashMap<String, String>,
    },

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("No executor registered for job type {0}")]
    UnsupportedType(JobType),

    #[error("Job service unavailable: {0}")]
    Unavailable(String),
}

impl JobError {
    pub fn validation(message: impl Into<String>, field_errors: HashMap<String, String>) -> Self {
        JobError::Validation {
            message: message.into(),
            field_errors,
        }
    }

    pub fn missing_field(field: &str) -> Self {
        let mut field_errors = HashMap::new();
        field_errors.insert(field.to_string(), "This field is required".to_string());
        JobError::validation("Missing required fields", field_errors)
    }
}

/// Failure inside a running job. Recorded on the job, never returned to the
/// request that created it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("invalid parameter '{field}': {reason}")]
    InvalidParameter { field: String, reason: String },

    #[error("{step} failed: {reason}")]
    StepFailed { step: &'static str, reason: String },

    #[error("data source error: {0}")]
    DataSource(String),

    #[error("job was cancelled")]
    Cancelled,

    #[error("job bookkeeping error: {0}")]
    Internal(String),

    #[error("executor panicked: {0}")]
    Panicked(String),
}

impl ExecutionError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ExecutionError::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn step(step: &'static str, reason: impl Into<String>) -> Self {
        ExecutionError::StepFailed {
            step,
            reason: reason.into(),
        }
    }
}
