//! Configuration module for environment variable parsing.
//!
//! These settings describe the listener itself. The deploy secret and
//! deployment root live in the per-deployment key=value file, which is
//! re-read on every request (see [`crate::deploy::kv`]).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::deploy::ConfigLocator;

/// Default minimum interval between accepted deploy requests.
pub const DEFAULT_RATE_LIMIT_SECS: u64 = 10;

/// Default login shell used to run `deploy.sh`.
pub const DEFAULT_DEPLOY_SHELL: &str = "/bin/bash";

/// Listener configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Address to bind to
    pub bind_address: String,

    /// Path of the deploy trigger endpoint
    pub webhook_path: String,

    /// How the deploy configuration file is located
    pub locator: ConfigLocator,

    /// Home directory handed to the deploy script (may be empty)
    pub home: String,

    /// Minimum interval between accepted deploy requests
    pub rate_limit_window: Duration,

    /// Rate-limit marker file; defaults to a file under `BASE_DIR/shared`
    pub rate_limit_file: Option<PathBuf>,

    /// Login shell that runs `deploy.sh`
    pub deploy_shell: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let home = env::var("HOME").unwrap_or_default();

        Config {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),

            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()),

            webhook_path: parse_path("WEBHOOK_PATH", "/deploy"),

            locator: locator_from_env(&home),

            home,

            rate_limit_window: Duration::from_secs(parse_u64(
                "DEPLOY_RATE_LIMIT_SECS",
                DEFAULT_RATE_LIMIT_SECS,
            )),

            rate_limit_file: env::var("DEPLOY_RATE_LIMIT_FILE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),

            deploy_shell: env::var("DEPLOY_SHELL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DEPLOY_SHELL.to_string()),
        }
    }

    /// Configuration for a given locator, with every other setting at its default.
    pub fn with_locator(locator: ConfigLocator) -> Self {
        Config {
            port: 8080,
            bind_address: "0.0.0.0".to_string(),
            webhook_path: "/deploy".to_string(),
            locator,
            home: String::new(),
            rate_limit_window: Duration::from_secs(DEFAULT_RATE_LIMIT_SECS),
            rate_limit_file: None,
            deploy_shell: DEFAULT_DEPLOY_SHELL.to_string(),
        }
    }
}

/// Pick the config locator from `DEPLOY_CONFIG_PATH` / `DEPLOY_CONFIG_STRATEGY`.
fn locator_from_env(home: &str) -> ConfigLocator {
    if let Some(path) = env::var("DEPLOY_CONFIG_PATH")
        .ok()
        .filter(|v| !v.trim().is_empty())
    {
        return ConfigLocator::Explicit(PathBuf::from(path));
    }

    let strategy = env::var("DEPLOY_CONFIG_STRATEGY").unwrap_or_else(|_| "install".to_string());
    match strategy.trim() {
        "home" => ConfigLocator::HomeGuess {
            home: home.to_string(),
        },
        "install" => ConfigLocator::InstallRelative {
            install_dir: install_dir(),
        },
        other => {
            warn!(strategy = %other, "Unknown config strategy, using install");
            ConfigLocator::InstallRelative {
                install_dir: install_dir(),
            }
        }
    }
}

/// Directory the running executable was installed into, unless overridden.
fn install_dir() -> PathBuf {
    if let Ok(dir) = env::var("DEPLOY_INSTALL_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| {
            warn!("Could not determine executable location, using current directory");
            PathBuf::from(".")
        })
}

/// Parse an unsigned integer, warning and falling back on bad input.
fn parse_u64(name: &str, default: u64) -> u64 {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(env_var = name, value = %raw, "Invalid integer, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a route path, making sure it starts with a slash.
fn parse_path(name: &str, default: &str) -> String {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => {
            let raw = raw.trim();
            if raw.starts_with('/') {
                raw.to_string()
            } else {
                format!("/{}", raw)
            }
        }
        _ => default.to_string(),
    }
}
