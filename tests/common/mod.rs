#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::Value;

use kyb_jobs_api::app::{router, AppState};
use kyb_jobs_api::config::AppConfig;
use kyb_jobs_api::jobs::JobService;
use kyb_jobs_api::services::{BusinessMetrics, InMemoryMetricsSource};

/// A router served in-process on a free port, one per test.
pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub client: reqwest::Client,
    pub jobs: Arc<JobService>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() > deadline {
                break;
            }
            if let Ok(resp) = self.client.get(self.url("/health")).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    /// Poll a job until it reaches a terminal status
    pub async fn wait_terminal(&self, job_id: &str, timeout: Duration) -> Result<Value> {
        let deadline = Instant::now() + timeout;
        loop {
            let body: Value = self
                .client
                .get(self.url(&format!("/api/jobs/{}", job_id)))
                .send()
                .await?
                .json()
                .await?;
            let job = body["data"].clone();
            if matches!(job["status"].as_str(), Some("completed" | "failed" | "cancelled")) {
                return Ok(job);
            }
            if Instant::now() > deadline {
                anyhow::bail!("job {} still {} after {:?}", job_id, job["status"], timeout);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Metrics for the businesses the integration tests submit jobs for
pub fn seeded_metrics() -> Arc<InMemoryMetricsSource> {
    let metrics = InMemoryMetricsSource::new();
    metrics.insert(BusinessMetrics {
        business_id: "biz-1".to_string(),
        verification_checks: 20,
        passed_checks: 19,
        open_alerts: 2,
        resolved_alerts: 8,
        risk_score: 35,
        documents_on_file: 6,
    })
    .expect("seed biz-1 metrics");
    metrics.insert(BusinessMetrics {
        business_id: "biz-2".to_string(),
        verification_checks: 10,
        passed_checks: 5,
        open_alerts: 7,
        resolved_alerts: 1,
        risk_score: 80,
        documents_on_file: 1,
    })
    .expect("seed biz-2 metrics");
    // More passed checks than were run
    metrics.insert(BusinessMetrics {
        business_id: "biz-bad".to_string(),
        verification_checks: 5,
        passed_checks: 9,
        open_alerts: 0,
        resolved_alerts: 0,
        risk_score: 10,
        documents_on_file: 0,
    })
    .expect("seed biz-bad metrics");
    Arc::new(metrics)
}

pub async fn spawn_server() -> Result<TestServer> {
    spawn_server_with(AppConfig::for_tests()).await
}

pub async fn spawn_server_with(config: AppConfig) -> Result<TestServer> {
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let base_url = format!("http://127.0.0.1:{}", port);

    let state = AppState::build(config, seeded_metrics());
    let jobs = state.jobs.clone();

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("failed to bind {}", base_url))?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router(state)).await;
    });

    let server = TestServer {
        port,
        base_url,
        client: reqwest::Client::new(),
        jobs,
    };
    server.wait_ready(Duration::from_secs(5)).await?;
    Ok(server)
}
