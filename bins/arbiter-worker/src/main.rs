mod blob;
mod callback;
mod config;
mod evaluator;
mod handlers;
mod languages;
mod output;
mod routes;
mod service;
mod supervisor;


use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::callback::OrchestratorClient;
use crate::config::Settings;
use crate::service::EvaluationService;

pub struct AppState {
    pub settings: Arc<Settings>,
    pub service: EvaluationService,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Arbiter worker booting...");

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("invalid configuration: {e:#}");
            std::process::exit(1);
        }
    };

    tokio::fs::create_dir_all(&settings.sandbox_root)
        .await
        .with_context(|| {
            format!(
                "failed to create sandbox root {}",
                settings.sandbox_root.display()
            )
        })?;

    info!(
        language = %settings.language,
        sandbox_root = %settings.sandbox_root.display(),
        max_time_sec = settings.limits.max_time_sec,
        max_memory_mb = settings.limits.max_memory_mb,
        "worker configured"
    );

    let settings = Arc::new(settings);
    let blobs = blob::from_backend(&settings.blob);
    let orchestrator = OrchestratorClient::new(&settings);
    let service = EvaluationService::new(Arc::clone(&settings), blobs, orchestrator);

    let state = Arc::new(AppState {
        settings: Arc::clone(&settings),
        service,
    });

    let app = routes::routes(state);

    let listener = TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;

    info!("HTTP server listening on {}", settings.bind_addr);
    info!("Ready to accept jobs");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("worker shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to install CTRL+C handler");
        return;
    }
    warn!("received CTRL+C - shutting down after in-flight batches");
}
