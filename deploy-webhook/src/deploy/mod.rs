//! Deploy module - everything between an authenticated request and a
//! detached `deploy.sh`.
//!
//! This module provides:
//! - A parser for the per-deployment key=value config file
//! - Config file location strategies
//! - Constant-time token comparison
//! - A marker-file rate limiter
//! - Shell-safe construction and launch of the detached deploy command

pub mod dispatch;
pub mod kv;
pub mod locator;
pub mod rate_limit;
pub mod token;

pub use dispatch::{dispatch, shell_quote, DispatchPlan};
pub use kv::{parse_kv_file, parse_kv_str, DeployConfig};
pub use locator::{ConfigLocator, CONFIG_FILE_NAME};
pub use rate_limit::{unix_now, RateDecision, RateLimiter, MARKER_FILE_NAME};
pub use token::{token_fingerprint, tokens_match};
