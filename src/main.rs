use std::sync::Arc;

use anyhow::Context;

use kyb_jobs_api::{app, config, observability, services::SyntheticMetricsSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up KYB_API_PORT, LOG_LEVEL, etc.
    let _ = dotenvy::dotenv();

    // Initialize configuration (this loads the config singleton)
    let config = config::config();
    observability::init_tracing(&config.logging);
    tracing::info!("Starting KYB Jobs API in {:?} mode", config.environment);

    let state = app::AppState::build(config.clone(), Arc::new(SyntheticMetricsSource));
    let jobs = state.jobs.clone();

    jobs.spawn_sweeper(config.jobs.sweep_interval());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("KYB Jobs API listening on http://{}", bind_addr);

    axum::serve(listener, app::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("HTTP server stopped, cancelling in-flight jobs");
    jobs.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
