//! Deploy webhook - authenticated HTTP trigger for out-of-band deployments.
//!
//! A single POST endpoint checks a shared-secret header, applies a coarse
//! time-based rate limit, and launches `BASE_DIR/deploy.sh` as a detached
//! process. The response returns as soon as the script has been detached.
//!
//! ## Request flow
//!
//! ```text
//! POST → method → config → token → rate limit → deploy.sh exists → detach → 200 OK
//! ```

pub mod config;
pub mod deploy;
pub mod error;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use deploy::{ConfigLocator, DeployConfig, DispatchPlan, RateDecision, RateLimiter};
pub use error::DeployError;
pub use web::{build_router, AppState};
