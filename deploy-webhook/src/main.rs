//! Deploy webhook server.
//!
//! This binary serves a single authenticated endpoint that:
//! - Checks the `X-Deploy-Token` header against the deploy config
//! - Applies a coarse time-based rate limit
//! - Launches `BASE_DIR/deploy.sh` detached and returns immediately

use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use deployhook::{build_router, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("deploy_webhook_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        bind_address = %config.bind_address,
        webhook_path = %config.webhook_path,
        locator = ?config.locator,
        config_path = ?config.locator.initial_path(),
        rate_limit_secs = config.rate_limit_window.as_secs(),
        rate_limit_file = ?config.rate_limit_file,
        deploy_shell = %config.deploy_shell,
        "config_loaded"
    );

    let ip: IpAddr = config
        .bind_address
        .parse()
        .context("Invalid bind address")?;
    let addr = SocketAddr::new(ip, config.port);

    let app = build_router(AppState::new(config));

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "deploy_webhook_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("deploy_webhook_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("deploy_webhook_shutting_down");
}
