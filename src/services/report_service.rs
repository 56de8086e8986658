use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::jobs::{ExecutionError, JobContext, JobExecutor, JobType, JobStep, StepTracker};
use crate::services::metrics::{BusinessMetrics, MetricsSource};

const STEPS: &[JobStep] = &[
    JobStep { name: "validate", description: "Validating report parameters" },
    JobStep { name: "fetch_metrics", description: "Fetching business metrics" },
    JobStep { name: "compute", description: "Computing report summary" },
    JobStep { name: "format", description: "Formatting report output" },
];

pub const REPORT_TYPES: &[&str] = &["compliance_summary", "risk_assessment", "verification_status"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReportFormat {
    Json,
    Csv,
}

/// Builds compliance, risk and verification reports from business metrics
pub struct ReportService {
    metrics: Arc<dyn MetricsSource>,
}

impl ReportService {
    pub fn new(metrics: Arc<dyn MetricsSource>) -> Self {
        Self { metrics }
    }

    fn summarize(report_type: &str, m: &BusinessMetrics) -> Value {
        let pass_rate = round2(m.pass_rate() * 100.0);
        match report_type {
            "compliance_summary" => json!({
                "compliance_score": pass_rate,
                "checks_run": m.verification_checks,
                "checks_passed": m.passed_checks,
                "open_alerts": m.open_alerts,
                "status": if pass_rate >= 90.0 && m.open_alerts == 0 { "compliant" } else { "needs_review" },
            }),
            "risk_assessment" => json!({
                "risk_score": m.risk_score,
                "risk_level": risk_level(m.risk_score),
                "open_alerts": m.open_alerts,
                "alert_resolution_rate": resolution_rate(m),
            }),
            _ => json!({
                "verification_pass_rate": pass_rate,
                "documents_on_file": m.documents_on_file,
                "failed_checks": m.verification_checks.saturating_sub(m.passed_checks),
            }),
        }
    }
}

#[async_trait]
impl JobExecutor for ReportService {
    fn job_type(&self) -> JobType {
        JobType::ReportGeneration
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &["report_type"]
    }

    fn steps(&self) -> &'static [JobStep] {
        STEPS
    }

    async fn execute(&self, ctx: &JobContext, steps: &mut StepTracker) -> Result<Value, ExecutionError> {
        steps.enter("validate").await?;
        let report_type = ctx.str_param("report_type").unwrap_or_default().to_string();
        if !REPORT_TYPES.contains(&report_type.as_str()) {
            return Err(ExecutionError::invalid(
                "report_type",
                format!("expected one of {}", REPORT_TYPES.join(", ")),
            ));
        }
        let format = match ctx.str_param("format").unwrap_or("json") {
            "json" => ReportFormat::Json,
            "csv" => ReportFormat::Csv,
            other => return Err(ExecutionError::invalid("format", format!("unsupported format '{}'", other))),
        };

        steps.enter("fetch_metrics").await?;
        let metrics = self
            .metrics
            .business_metrics(&ctx.owner_id)
            .await
            .map_err(|e| ExecutionError::DataSource(e.to_string()))?;
        check_consistent(&metrics)?;

        steps.enter("compute").await?;
        let summary = Self::summarize(&report_type, &metrics);

        steps.enter("format").await?;
        let mut report = json!({
            "report_id": format!("rpt_{}", ctx.job_id),
            "report_type": report_type,
            "business_id": ctx.owner_id,
            "generated_at": Utc::now(),
            "summary": summary,
        });
        if format == ReportFormat::Csv {
            report["format"] = json!("csv");
            report["content"] = json!(to_csv(&report["summary"]));
        } else {
            report["format"] = json!("json");
        }
        Ok(report)
    }
}

fn risk_level(score: u8) -> &'static str {
    match score {
        0..=29 => "low",
        30..=59 => "medium",
        60..=84 => "high",
        _ => "critical",
    }
}

fn resolution_rate(m: &BusinessMetrics) -> f64 {
    let total = u64::from(m.open_alerts) + u64::from(m.resolved_alerts);
    if total == 0 {
        return 100.0;
    }
    round2(m.resolved_alerts as f64 / total as f64 * 100.0)
}

/// Figures that contradict each other are a data source fault, not a report
fn check_consistent(m: &BusinessMetrics) -> Result<(), ExecutionError> {
    if m.passed_checks > m.verification_checks {
        return Err(ExecutionError::DataSource(format!(
            "inconsistent metrics for {}: {} passed of {} checks",
            m.business_id, m.passed_checks, m.verification_checks
        )));
    }
    if m.risk_score > 100 {
        return Err(ExecutionError::DataSource(format!(
            "inconsistent metrics for {}: risk score {} above 100",
            m.business_id, m.risk_score
        )));
    }
    Ok(())
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Two-line CSV: sorted keys, then values
fn to_csv(summary: &Value) -> String {
    let Some(object) = summary.as_object() else {
        return String::new();
    };
    let mut keys: Vec<&String> = object.keys().collect();
    keys.sort();
    let values: Vec<String> = keys
        .iter()
        .map(|k| match &object[k.as_str()] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    let header: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
    format!("{}\n{}\n", header.join(","), values.join(","))
}
