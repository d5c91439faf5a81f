use anyhow::Context;
use cashpilot_insights::InsightEngine;
use tokio::net::TcpListener;

mod config;
mod error;
mod routes;
mod telemetry;

use config::ServerConfig;
use routes::ApiState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("Failed to load server config")?;
    telemetry::init(config.log_format);

    let categorizer = config
        .categorizer()
        .context("Failed to load categorization rules")?;
    let engine = InsightEngine::with_categorizer(config.analysis.clone(), categorizer);
    let app = routes::router(ApiState::new(engine), config.body_limit);

    let listener = TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.addr))?;
    tracing::info!("CashPilot server listening on http://{}", config.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("CashPilot server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {e}");
    }
}
