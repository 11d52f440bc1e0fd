//! Deploy endpoint handlers.
//!
//! The deploy handler is a linear guard chain:
//! 1. Method must be POST
//! 2. Deploy config must be found and name DEPLOY_TOKEN and BASE_DIR
//! 3. The token header must match
//! 4. The rate-limit window must have passed
//! 5. BASE_DIR/deploy.sh must exist
//!
//! Each guard has exactly one failure response. Past the last guard the
//! deploy is detached and the handler returns.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::deploy::{
    dispatch, token_fingerprint, tokens_match, unix_now, DispatchPlan, RateDecision, RateLimiter,
};
use crate::error::DeployError;
use crate::Config;

/// Header carrying the caller's deploy token.
pub const DEPLOY_TOKEN_HEADER: &str = "X-Deploy-Token";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Deploy Trigger
// =============================================================================

/// Deploy trigger endpoint.
pub async fn deploy(State(state): State<AppState>, method: Method, headers: HeaderMap) -> Response {
    match trigger(&state, &method, &headers).await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            match &e {
                DeployError::ConfigNotFound(source)
                | DeployError::RateLimitStore(source)
                | DeployError::DispatchFailed(source) => {
                    error!(status = e.status().as_u16(), error = %source, "deploy_failed");
                }
                DeployError::GuardAborted(source) => {
                    error!(
                        status = e.status().as_u16(),
                        panicked = source.is_panic(),
                        error = %source,
                        "deploy_guard_aborted"
                    );
                }
                DeployError::ConfigIncomplete | DeployError::ScriptMissing => {
                    error!(status = e.status().as_u16(), reason = %e, "deploy_misconfigured");
                }
                _ => {
                    warn!(status = e.status().as_u16(), reason = %e, "deploy_rejected");
                }
            }
            e.into_response()
        }
    }
}

async fn trigger(state: &AppState, method: &Method, headers: &HeaderMap) -> Result<String, DeployError> {
    if *method != Method::POST {
        return Err(DeployError::MethodNotAllowed);
    }

    let provided = headers
        .get(DEPLOY_TOKEN_HEADER)
        .map(|v| v.as_bytes().to_vec())
        .unwrap_or_default();

    info!(
        token_fingerprint = %token_fingerprint(&provided),
        "deploy_request_received"
    );

    let config = Arc::clone(&state.config);
    let plan = tokio::task::spawn_blocking(move || authorize(&config, &provided, unix_now()))
        .await
        .map_err(DeployError::GuardAborted)??;

    let body = dispatch(&plan).await.map_err(DeployError::DispatchFailed)?;

    info!(
        base_dir = %plan.base_dir,
        log = %plan.log_path().display(),
        "deploy_dispatched"
    );

    Ok(body)
}

/// Guards 2 to 5: everything that touches the filesystem before dispatch.
///
/// `now` is the request time in unix seconds.
pub fn authorize(config: &Config, provided: &[u8], now: u64) -> Result<DispatchPlan, DeployError> {
    let deploy_config = config.locator.load().map_err(DeployError::ConfigNotFound)?;

    let (Some(token), Some(base_dir), Some(raw_base_dir)) = (
        deploy_config.token(),
        deploy_config.base_dir(),
        deploy_config.raw_base_dir(),
    ) else {
        return Err(DeployError::ConfigIncomplete);
    };

    if !tokens_match(token, provided) {
        return Err(DeployError::Forbidden);
    }

    let limiter = match &config.rate_limit_file {
        Some(path) => RateLimiter::new(path, config.rate_limit_window),
        None => RateLimiter::for_base_dir(base_dir, config.rate_limit_window),
    };
    if let RateDecision::Limited { retry_after } = limiter
        .check_and_record(now)
        .map_err(DeployError::RateLimitStore)?
    {
        return Err(DeployError::RateLimited { retry_after });
    }

    let plan = DispatchPlan::new(
        config.home.as_str(),
        raw_base_dir,
        config.deploy_shell.as_str(),
    );
    if !plan.script_exists() {
        return Err(DeployError::ScriptMissing);
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::{ConfigLocator, CONFIG_FILE_NAME, MARKER_FILE_NAME};
    use crate::web::build_router;
    use axum::body::{to_bytes, Body};
    use axum::http::{HeaderValue, Request};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    const TOKEN: &str = "correct-horse-battery-staple";

    /// A deployment root with `shared/` and a config naming itself.
    fn deploy_root(with_script: bool) -> TempDir {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("shared")).unwrap();
        fs::write(
            dir.path().join("shared").join(CONFIG_FILE_NAME),
            format!(
                "# deploy webhook\nDEPLOY_TOKEN=\"{}\"\nBASE_DIR={}\n",
                TOKEN,
                dir.path().display()
            ),
        )
        .unwrap();
        if with_script {
            write_script(dir.path(), "#!/bin/sh\necho \"deploying $BASE_DIR\"\n");
        }
        dir
    }

    fn write_script(base: &Path, body: &str) {
        let script = base.join("deploy.sh");
        fs::write(&script, body).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn test_config(base: &Path) -> Config {
        let mut config = Config::with_locator(ConfigLocator::Explicit(
            base.join("shared").join(CONFIG_FILE_NAME),
        ));
        config.home = base.display().to_string();
        config.deploy_shell = "/bin/sh".to_string();
        config
    }

    async fn send(config: Config, method: &str, token: Option<&str>) -> (StatusCode, HeaderMap, String) {
        send_bytes(config, method, token.map(str::as_bytes)).await
    }

    /// Like `send`, but the token header may carry any header-legal bytes.
    async fn send_bytes(
        config: Config,
        method: &str,
        token: Option<&[u8]>,
    ) -> (StatusCode, HeaderMap, String) {
        let app = build_router(AppState::new(config));
        let mut request = Request::builder().method(method).uri("/deploy");
        if let Some(token) = token {
            request = request.header(DEPLOY_TOKEN_HEADER, HeaderValue::from_bytes(token).unwrap());
        }
        let response = app
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_non_post_rejected_before_config() {
        let config = Config::with_locator(ConfigLocator::Explicit("/nonexistent/cfg".into()));

        for method in ["GET", "PUT", "DELETE", "PATCH", "HEAD"] {
            let (status, headers, body) = send(config.clone(), method, Some(TOKEN)).await;
            assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{}", method);
            assert_eq!(headers[header::ALLOW], "POST");
            if method != "HEAD" {
                assert_eq!(body, "Use POST\n");
            }
        }
    }

    #[tokio::test]
    async fn test_missing_config() {
        let config = Config::with_locator(ConfigLocator::Explicit("/nonexistent/cfg".into()));
        let (status, headers, body) = send(config, "POST", Some(TOKEN)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Config not found.\n");
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    }

    #[tokio::test]
    async fn test_incomplete_config() {
        let root = deploy_root(true);
        fs::write(
            root.path().join("shared").join(CONFIG_FILE_NAME),
            format!("DEPLOY_TOKEN=\nBASE_DIR={}\n", root.path().display()),
        )
        .unwrap();

        let (status, _, body) = send(test_config(root.path()), "POST", Some("")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Config missing DEPLOY_TOKEN or BASE_DIR\n");
    }

    #[tokio::test]
    async fn test_wrong_or_missing_token_forbidden() {
        let root = deploy_root(true);

        for token in [Some("correct-horse-battery-stapler"), Some(""), None] {
            let (status, _, body) = send(test_config(root.path()), "POST", token).await;
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(body, "Forbidden\n");
        }
        // Rejected callers never touch the rate-limit marker.
        assert!(!root.path().join("shared").join(MARKER_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_utf8_token_compared_by_content() {
        let root = deploy_root(true);
        fs::write(
            root.path().join("shared").join(CONFIG_FILE_NAME),
            format!("DEPLOY_TOKEN=pässwörd\nBASE_DIR={}\n", root.path().display()),
        )
        .unwrap();

        let (status, _, body) =
            send_bytes(test_config(root.path()), "POST", Some("passwörd".as_bytes())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, "Forbidden\n");

        let (status, _, body) =
            send_bytes(test_config(root.path()), "POST", Some("pässwörd".as_bytes())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK\n");
    }

    #[tokio::test]
    async fn test_missing_script() {
        let root = deploy_root(false);
        let (status, _, body) = send(test_config(root.path()), "POST", Some(TOKEN)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "deploy.sh not found\n");
    }

    #[tokio::test]
    async fn test_script_directory_is_not_a_script() {
        let root = deploy_root(false);
        fs::create_dir(root.path().join("deploy.sh")).unwrap();
        let (status, _, body) = send(test_config(root.path()), "POST", Some(TOKEN)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "deploy.sh not found\n");
    }

    #[tokio::test]
    async fn test_dispatch_then_rate_limited() {
        let root = deploy_root(true);

        let (status, _, body) = send(test_config(root.path()), "POST", Some(TOKEN)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK\n");

        let (status, headers, body) = send(test_config(root.path()), "POST", Some(TOKEN)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body, "Too Many Requests\n");
        assert!(headers.contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn test_window_elapsed_allows_dispatch() {
        let root = deploy_root(true);
        fs::write(
            root.path().join("shared").join(MARKER_FILE_NAME),
            format!("{}\n", unix_now() - 10),
        )
        .unwrap();

        let (status, _, body) = send(test_config(root.path()), "POST", Some(TOKEN)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("OK"));
    }

    #[tokio::test]
    async fn test_custom_rate_limit_file() {
        let root = deploy_root(true);
        let marker_dir = tempdir().unwrap();
        let marker = marker_dir.path().join("last");

        let mut config = test_config(root.path());
        config.rate_limit_file = Some(marker.clone());

        let (status, _, _) = send(config, "POST", Some(TOKEN)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(marker.exists());
        assert!(!root.path().join("shared").join(MARKER_FILE_NAME).exists());
    }

    #[test]
    fn test_authorize_rate_limit_with_clock() {
        let root = deploy_root(true);
        let config = test_config(root.path());

        assert!(authorize(&config, TOKEN.as_bytes(), 1_000).is_ok());
        assert!(matches!(
            authorize(&config, TOKEN.as_bytes(), 1_005),
            Err(DeployError::RateLimited { .. })
        ));
        let plan = authorize(&config, TOKEN.as_bytes(), 1_010).unwrap();
        assert_eq!(plan.base_dir, root.path().display().to_string());
        assert_eq!(plan.shell, "/bin/sh");
    }

    #[tokio::test]
    async fn test_health() {
        let config = Config::with_locator(ConfigLocator::Explicit("/nonexistent/cfg".into()));
        let app = build_router(AppState::new(config));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }
}
