mod api;
mod bootstrap;
mod health;
mod upstream;

use std::time::Duration;

use anyhow::Result;
use axum::Router;
use staffflow_core::config::{AppConfig, LoadOptions};
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

fn init_logging(config: &AppConfig) {
    use staffflow_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = app.config.server_address();
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);

    let router = Router::new()
        .merge(api::router(app.service.clone()))
        .merge(health::router(app.db_pool.clone()))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "staffflow-server listening"
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        grace_secs = grace.as_secs(),
        "staffflow-server draining in-flight requests"
    );
    let _ = stop_tx.send(());

    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            event_name = "system.server.shutdown_timeout",
            correlation_id = "shutdown",
            "in-flight requests did not finish within the grace period"
        ),
    }
    app.db_pool.close().await;

    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "staffflow-server stopped"
    );
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
