// Background job tracking: record, store, runner, and the service boundary
// the HTTP handlers call into.

pub mod error;
pub mod executor;
pub mod record;
pub mod runner;
pub mod service;
pub mod store;

pub use error::{ExecutionError, JobError, TransitionError};
pub use executor::{ExecutorRegistry, JobContext, JobExecutor, JobStep, StepTracker};
pub use record::{JobId, JobRecord, JobStatus, JobType};
pub use runner::JobRunner;
pub use service::{JobPage, JobService, JobServiceConfig};
pub use store::{JobFilter, JobStats, JobStore, RetentionPolicy};
