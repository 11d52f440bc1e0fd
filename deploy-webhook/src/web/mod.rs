//! Web server module for the deploy trigger.
//!
//! This module provides a thin web server that:
//! - Accepts `POST` on the configured webhook path
//! - Authenticates, rate limits and launches the deploy
//! - Returns as soon as the deploy is detached
//!
//! The deploy itself runs out-of-band; its outcome only reaches the log file.

pub mod handlers;

use axum::{
    routing::{any, get},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{deploy, health, AppState, HealthResponse, DEPLOY_TOKEN_HEADER};

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    let webhook_path = state.config.webhook_path.clone();

    Router::new()
        .route("/health", get(health))
        .route(&webhook_path, any(deploy))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
