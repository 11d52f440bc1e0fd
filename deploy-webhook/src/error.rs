//! Request failure taxonomy.
//!
//! Every guard in the deploy handler fails with one of these. Client errors
//! and rate limiting are 4xx; operator misconfiguration is 500. Bodies are
//! fixed plain-text strings; I/O detail only goes to the log.

use std::io;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tokio::task::JoinError;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Use POST")]
    MethodNotAllowed,

    #[error("Config not found.")]
    ConfigNotFound(#[source] io::Error),

    #[error("Config missing DEPLOY_TOKEN or BASE_DIR")]
    ConfigIncomplete,

    #[error("Forbidden")]
    Forbidden,

    #[error("Too Many Requests")]
    RateLimited { retry_after: Duration },

    #[error("rate limit marker unavailable")]
    RateLimitStore(#[source] io::Error),

    #[error("deploy.sh not found")]
    ScriptMissing,

    #[error("Dispatch failed")]
    DispatchFailed(#[source] io::Error),

    /// The pre-dispatch checks panicked or were cancelled; nothing was launched.
    #[error("Internal Server Error")]
    GuardAborted(#[source] JoinError),
}

impl DeployError {
    pub fn status(&self) -> StatusCode {
        match self {
            DeployError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            DeployError::Forbidden => StatusCode::FORBIDDEN,
            DeployError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            DeployError::ConfigNotFound(_)
            | DeployError::ConfigIncomplete
            | DeployError::RateLimitStore(_)
            | DeployError::ScriptMissing
            | DeployError::DispatchFailed(_)
            | DeployError::GuardAborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Response body; one line of fixed text.
    pub fn body(&self) -> String {
        match self {
            DeployError::RateLimitStore(_) => "Rate limit unavailable\n".to_string(),
            other => format!("{}\n", other),
        }
    }
}

impl IntoResponse for DeployError {
    fn into_response(self) -> Response {
        let mut response = (
            self.status(),
            [(header::CONTENT_TYPE, TEXT_PLAIN)],
            self.body(),
        )
            .into_response();

        let headers = response.headers_mut();
        match &self {
            DeployError::MethodNotAllowed => {
                headers.insert(header::ALLOW, HeaderValue::from_static("POST"));
            }
            DeployError::RateLimited { retry_after } => {
                headers.insert(
                    header::RETRY_AFTER,
                    HeaderValue::from(retry_after.as_secs().max(1)),
                );
            }
            _ => {}
        }

        response
    }
}
