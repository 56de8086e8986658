use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeSet;

use crate::jobs::{ExecutionError, JobContext, JobExecutor, JobType, JobStep, StepTracker};

const STEPS: &[JobStep] = &[
    JobStep { name: "load_framework", description: "Loading governance framework" },
    JobStep { name: "evaluate_controls", description: "Evaluating implemented controls" },
    JobStep { name: "score", description: "Scoring compliance" },
    JobStep { name: "recommend", description: "Building recommendations" },
];

/// A governance framework and the controls it requires
#[derive(Debug, Clone, Copy)]
pub struct Framework {
    pub id: &'static str,
    pub name: &'static str,
    pub controls: &'static [(&'static str, &'static str)],
}

pub const FRAMEWORKS: &[Framework] = &[
    Framework {
        id: "soc2",
        name: "SOC 2 Type II",
        controls: &[
            ("CC1.1", "Integrity and ethical values"),
            ("CC2.1", "Information quality for internal control"),
            ("CC3.1", "Risk assessment objectives"),
            ("CC5.2", "Technology general controls"),
            ("CC6.1", "Logical access security"),
            ("CC7.2", "System monitoring"),
            ("CC8.1", "Change management"),
        ],
    },
    Framework {
        id: "iso27001",
        name: "ISO/IEC 27001",
        controls: &[
            ("A.5.1", "Information security policies"),
            ("A.6.1", "Internal organization"),
            ("A.8.1", "Asset inventory"),
            ("A.9.2", "User access management"),
            ("A.12.4", "Logging and monitoring"),
            ("A.16.1", "Incident management"),
        ],
    },
    Framework {
        id: "gdpr",
        name: "General Data Protection Regulation",
        controls: &[
            ("ART5", "Principles of processing"),
            ("ART30", "Records of processing activities"),
            ("ART32", "Security of processing"),
            ("ART33", "Breach notification"),
            ("ART35", "Data protection impact assessment"),
        ],
    },
    Framework {
        id: "pci_dss",
        name: "PCI DSS v4.0",
        controls: &[
            ("REQ1", "Network security controls"),
            ("REQ3", "Protect stored account data"),
            ("REQ8", "Identify users and authenticate access"),
            ("REQ10", "Log and monitor all access"),
            ("REQ11", "Test security regularly"),
            ("REQ12", "Organizational security policies"),
        ],
    },
];

pub fn find_framework(id: &str) -> Option<&'static Framework> {
    let id = id.trim().to_ascii_lowercase();
    FRAMEWORKS.iter().find(|f| f.id == id)
}

/// Scores a business against a governance framework's control set
#[derive(Debug, Clone, Default)]
pub struct GovernanceService;

impl GovernanceService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobExecutor for GovernanceService {
    fn job_type(&self) -> JobType {
        JobType::GovernanceAssessment
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["framework_id"]
    }

    fn steps(&self) -> &'static [JobStep] {
        STEPS
    }

    async fn execute(&self, ctx: &JobContext, steps: &mut StepTracker) -> Result<Value, ExecutionError> {
        steps.enter("load_framework").await?;
        let framework_id = ctx.str_param("framework_id").unwrap_or_default();
        let framework = find_framework(framework_id).ok_or_else(|| {
            ExecutionError::step("load_framework", format!("unknown framework '{}'", framework_id))
        })?;

        steps.enter("evaluate_controls").await?;
        let implemented: BTreeSet<String> = match ctx.payload.get("implemented_controls") {
            None | Some(Value::Null) => BTreeSet::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(|s| s.trim().to_ascii_uppercase())
                        .ok_or_else(|| ExecutionError::invalid("implemented_controls", "entries must be strings"))
                })
                .collect::<Result<_, _>>()?,
            Some(_) => {
                return Err(ExecutionError::invalid("implemented_controls", "must be an array of control ids"))
            }
        };
        let (met, missing): (Vec<_>, Vec<_>) = framework
            .controls
            .iter()
            .partition(|(id, _)| implemented.contains(&id.to_ascii_uppercase()));

        steps.enter("score").await?;
        let total = framework.controls.len();
        let score = if total == 0 {
            0.0
        } else {
            ((met.len() as f64 / total as f64) * 10_000.0).round() / 100.0
        };

        steps.enter("recommend").await?;
        let recommendations: Vec<Value> = missing
            .iter()
            .map(|(id, title)| {
                json!({
                    "control_id": id,
                    "title": title,
                    "action": format!("Implement and evidence control {} ({})", id, title),
                })
            })
            .collect();

        Ok(json!({
            "framework_id": framework.id,
            "framework_name": framework.name,
            "business_id": ctx.owner_id,
            "total_controls": total,
            "implemented_controls": met.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            "missing_controls": missing.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            "compliance_score": score,
            "maturity": maturity(score),
            "recommendations": recommendations,
            "assessed_at": Utc::now(),
        }))
    }
}

fn maturity(score: f64) -> &'static str {
    if score >= 90.0 {
        "optimized"
    } else if score >= 70.0 {
        "managed"
    } else if score >= 40.0 {
        "developing"
    } else {
        "initial"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{ExecutorRegistry, JobRecord, JobService, JobServiceConfig, JobStatus, JobStore};
    use std::sync::Arc;
    use std::time::Duration;

    async fn run(payload: Value) -> JobRecord {
        let registry = ExecutorRegistry::new().with(Arc::new(GovernanceService::new()));
        let svc = JobService::new(Arc::new(JobStore::new()), registry, JobServiceConfig::default());
        let job = svc
            .create_job("biz-1", JobType::GovernanceAssessment, payload)
            .await
            .unwrap();
        for _ in 0..500 {
            let current = svc.get_job(&job.id).await.unwrap();
            if current.status.is_terminal() {
                return current;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("governance job did not finish");
    }

    #[tokio::test]
    async fn scores_implemented_controls() {
        let job = run(json!({
            "framework_id": "GDPR",
            "implemented_controls": ["art5", "ART30", "ART32", "NOT-A-CONTROL"],
        }))
        .await;

        assert_eq!(job.status, JobStatus::Completed);
        let result = job.result.unwrap();
        assert_eq!(result["total_controls"], 5);
        assert_eq!(result["compliance_score"], 60.0);
        assert_eq!(result["maturity"], "developing");
        assert_eq!(result["missing_controls"], json!(["ART33", "ART35"]));
        assert_eq!(result["recommendations"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_framework_fails_on_first_step() {
        let job = run(json!({"framework_id": "hipaa"})).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.current_step, 1);
        assert_eq!(job.progress, 0.0);
        assert!(job.result.is_none());
        assert!(job.error.unwrap().contains("unknown framework 'hipaa'"));
    }

    #[tokio::test]
    async fn malformed_control_list_fails_at_evaluation() {
        let job = run(json!({"framework_id": "soc2", "implemented_controls": "CC1.1"})).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.current_step, 2);
    }

    #[test]
    fn framework_lookup_is_case_insensitive() {
        assert_eq!(find_framework(" PCI_DSS ").unwrap().id, "pci_dss");
        assert!(find_framework("nist").is_none());
    }
}
