mod admin;
mod api;
mod bootstrap;
mod export;
mod health;
mod notify;
mod simulator;
#[cfg(test)]
mod testing;
mod webhooks;

use std::time::Duration;

use anyhow::Result;
use listing_agent::IdleSweeper;
use listing_core::config::{AppConfig, LoadOptions};
use tokio::sync::watch;

fn init_logging(config: &AppConfig) {
    use listing_core::config::LogFormat::*;
    use tracing_subscriber::EnvFilter;

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
    // Load config and initialize logging before any other operations
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let idle_timeout = chrono::Duration::seconds(
        i64::try_from(app.config.conversation.idle_timeout_secs).unwrap_or(i64::MAX / 1_000),
    );
    let sweeper = IdleSweeper::for_manager(&app.manager, idle_timeout)
        .spawn(Duration::from_secs(app.config.conversation.sweep_interval_secs), shutdown_rx);

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        messaging = app.messaging,
        "listing-server started"
    );

    let routes = bootstrap::router(&app);
    let mut server_shutdown = shutdown_tx.subscribe();
    let server = tokio::spawn(async move {
        axum::serve(listener, routes)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            })
            .await
    });

    wait_for_shutdown().await?;
    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "listing-server stopping"
    );
    let _ = shutdown_tx.send(true);

    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(error))) => {
            tracing::error!(event_name = "system.server.error", error = %error, "server terminated with error");
        }
        Ok(Err(error)) => {
            tracing::error!(event_name = "system.server.error", error = %error, "server task panicked");
        }
        Err(_) => {
            tracing::warn!(
                event_name = "system.server.shutdown_timeout",
                grace_secs = grace.as_secs(),
                "in-flight requests did not finish before the grace period"
            );
        }
    }
    let _ = tokio::time::timeout(grace, sweeper).await;
    app.db_pool.close().await;

    tracing::info!(event_name = "system.server.stopped", correlation_id = "shutdown", "listing-server stopped");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
