use std::time::Duration;

use anyhow::anyhow;
use clap::Subcommand;
use serde_json::{json, Value};

use crate::cli::client::ApiClient;
use crate::cli::utils::{output_job_table, output_success, output_value, parse_params, parse_payload};
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum JobsCommands {
    #[command(about = "Submit a job (report, governance, transformation, catalog)")]
    Submit {
        #[arg(help = "Job type or alias")]
        job_type: String,
        #[arg(long, help = "Business the job runs for")]
        business_id: String,
        #[arg(long, value_name = "KEY=VALUE", help = "Job parameter (repeatable)")]
        param: Vec<String>,
        #[arg(long, help = "Job parameters as a JSON object, or @file")]
        payload: Option<String>,
    },

    #[command(about = "Show a job's status, progress, and result")]
    Get {
        #[arg(help = "Job ID")]
        id: String,
    },

    #[command(about = "List jobs, newest last")]
    List {
        #[arg(long, help = "Only jobs for this business")]
        business_id: Option<String>,
        #[arg(long, help = "Only jobs in this status")]
        status: Option<String>,
        #[arg(long = "type", help = "Only jobs of this type")]
        job_type: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
    },

    #[command(about = "Cancel a pending or processing job")]
    Cancel {
        #[arg(help = "Job ID")]
        id: String,
    },

    #[command(about = "Poll a job until it completes, fails, or is cancelled")]
    Wait {
        #[arg(help = "Job ID")]
        id: String,
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
    },

    #[command(about = "Job counts by status and type")]
    Stats,
}

pub async fn handle(cmd: JobsCommands, client: &ApiClient, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        JobsCommands::Submit { job_type, business_id, param, payload } => {
            let mut body = match payload {
                Some(raw) => parse_payload(&raw)?,
                None => serde_json::Map::new(),
            };
            body.extend(parse_params(&param)?);
            body.insert("type".to_string(), json!(job_type));
            body.insert("business_id".to_string(), json!(business_id));

            let accepted = client.post("/api/jobs", &Value::Object(body)).await?;
            let id = accepted["job_id"].as_str().unwrap_or_default();
            output_success(output_format, &format!("Job {} accepted", id), Some(accepted.clone()))
        }

        JobsCommands::Get { id } => {
            let job = client.get(&job_path(&id), &[]).await?;
            output_value(output_format, &job)
        }

        JobsCommands::List { business_id, status, job_type, limit, offset } => {
            let mut query: Vec<(&str, String)> = Vec::new();
            if let Some(b) = business_id {
                query.push(("business_id", b));
            }
            if let Some(s) = status {
                query.push(("status", s));
            }
            if let Some(t) = job_type {
                query.push(("type", t));
            }
            if let Some(l) = limit {
                query.push(("limit", l.to_string()));
            }
            if let Some(o) = offset {
                query.push(("offset", o.to_string()));
            }

            let page = client.get("/api/jobs", &query).await?;
            output_job_table(output_format, &page)
        }

        JobsCommands::Cancel { id } => {
            let job = client.delete(&job_path(&id)).await?;
            output_success(output_format, &format!("Job {} cancelled", id), Some(json!({ "job": job })))
        }

        JobsCommands::Wait { id, interval_ms, timeout_secs } => {
            let job = wait_for(
                client,
                &id,
                Duration::from_millis(interval_ms.max(50)),
                Duration::from_secs(timeout_secs),
                output_format,
            )
            .await?;

            output_value(output_format, &job)?;
            match job["status"].as_str() {
                Some("completed") => Ok(()),
                Some(status) => Err(anyhow!(
                    "job {} {}: {}",
                    id,
                    status,
                    job["error"].as_str().unwrap_or("no error recorded")
                )),
                None => Err(anyhow!("job {} has no status", id)),
            }
        }

        JobsCommands::Stats => {
            let stats = client.get("/api/jobs/stats", &[]).await?;
            output_value(output_format, &stats)
        }
    }
}

fn job_path(id: &str) -> String {
    format!("/api/jobs/{}", id.trim())
}

async fn wait_for(
    client: &ApiClient,
    id: &str,
    interval: Duration,
    timeout: Duration,
    output_format: OutputFormat,
) -> anyhow::Result<Value> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut last_step: Option<u64> = None;

    loop {
        let job = client.get(&job_path(id), &[]).await?;
        if is_terminal(&job) {
            return Ok(job);
        }

        let step = job["current_step"].as_u64();
        if output_format == OutputFormat::Text && step != last_step {
            println!(
                "[{:>3.0}%] {} ({}/{})",
                job["progress"].as_f64().unwrap_or(0.0) * 100.0,
                job["step_description"].as_str().unwrap_or("waiting to start"),
                step.unwrap_or(0),
                job["total_steps"].as_u64().unwrap_or(0),
            );
            last_step = step;
        }

        if tokio::time::Instant::now() + interval > deadline {
            return Err(anyhow!("timed out waiting for job {} after {:?}", id, timeout));
        }
        tokio::time::sleep(interval).await;
    }
}

fn is_terminal(job: &Value) -> bool {
    matches!(job["status"].as_str(), Some("completed" | "failed" | "cancelled"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(is_terminal(&json!({ "status": "completed" })));
        assert!(is_terminal(&json!({ "status": "cancelled" })));
        assert!(!is_terminal(&json!({ "status": "processing" })));
        assert!(!is_terminal(&json!({})));
    }

    #[test]
    fn job_path_trims_id() {
        assert_eq!(job_path(" abc "), "/api/jobs/abc");
    }
}
