use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::TransitionError;

/// Opaque job identifier, assigned once at creation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kinds of asynchronous work the platform tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ReportGeneration,
    GovernanceAssessment,
    DataTransformation,
    CatalogCreation,
}

impl JobType {
    pub const ALL: [JobType; 4] = [
        JobType::ReportGeneration,
        JobType::GovernanceAssessment,
        JobType::DataTransformation,
        JobType::CatalogCreation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ReportGeneration => "report_generation",
            JobType::GovernanceAssessment => "governance_assessment",
            JobType::DataTransformation => "data_transformation",
            JobType::CatalogCreation => "catalog_creation",
        }
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "report_generation" | "report" | "reports" => Ok(JobType::ReportGeneration),
            "governance_assessment" | "governance" => Ok(JobType::GovernanceAssessment),
            "data_transformation" | "transformation" | "transformations" => {
                Ok(JobType::DataTransformation)
            }
            "catalog_creation" | "catalog" | "catalogs" => Ok(JobType::CatalogCreation),
            other => Err(format!("Invalid job type: {}", other)),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            // Some older clients still send "running"
            "processing" | "running" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" | "canceled" => Ok(JobStatus::Cancelled),
            other => Err(format!("Invalid job status: {}", other)),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked unit of asynchronous work.
///
/// Mutable fields only change through the transition methods below, which
/// keep status monotonic and `result`/`error` mutually exclusive. The store
/// hands out clones; nothing outside the store holds a mutable reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    #[serde(rename = "business_id")]
    pub owner_id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress: f64,
    pub current_step: usize,
    pub total_steps: usize,
    pub step_description: Option<String>,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl JobRecord {
    pub fn new(owner_id: impl Into<String>, job_type: JobType, payload: Value, total_steps: usize) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            owner_id: owner_id.into(),
            job_type,
            status: JobStatus::Pending,
            progress: 0.0,
            current_step: 0,
            total_steps,
            step_description: None,
            payload,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
            result: None,
            error: None,
        }
    }

    /// pending -> processing
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Processing)?;
        let now = Utc::now();
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Move the cursor to step `index` (1-based). Progress counts the steps
    /// already finished, so it only reaches 1.0 through `complete`.
    pub fn enter_step(&mut self, index: usize, description: &str) -> Result<(), TransitionError> {
        if self.status != JobStatus::Processing {
            return Err(TransitionError::NotProcessing(self.status));
        }
        if index <= self.current_step || index > self.total_steps {
            return Err(TransitionError::StepOutOfOrder {
                current: self.current_step,
                requested: index,
                total: self.total_steps,
            });
        }
        self.current_step = index;
        self.step_description = Some(description.to_string());
        self.progress = (index - 1) as f64 / self.total_steps as f64;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// processing -> completed
    pub fn complete(&mut self, result: Value) -> Result<(), TransitionError> {
        self.transition(JobStatus::Completed)?;
        self.progress = 1.0;
        self.result = Some(result);
        self.error = None;
        self.finish();
        Ok(())
    }

    /// processing -> failed; progress stays at the failing step
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        self.result = None;
        self.finish();
        Ok(())
    }

    /// pending | processing -> cancelled
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Cancelled)?;
        self.finish();
        Ok(())
    }

    fn finish(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), TransitionError> {
        let allowed = match (self.status, to) {
            (JobStatus::Pending, JobStatus::Processing) => true,
            (JobStatus::Processing, JobStatus::Completed) => true,
            (JobStatus::Processing, JobStatus::Failed) => true,
            (JobStatus::Pending, JobStatus::Cancelled) => true,
            (JobStatus::Processing, JobStatus::Cancelled) => true,
            _ => false,
        };
        if !allowed {
            return Err(TransitionError::Invalid { from: self.status, to });
        }
        self.status = to;
        Ok(())
    }
}
