//! Deploy config file location strategies.
//!
//! Two deployments of the webhook exist in the wild: one installed inside
//! the deployment tree that finds its config relative to itself, and one
//! that starts from `$HOME/deploy` and follows the `BASE_DIR` it finds
//! there. Both are variants of [`ConfigLocator`], chosen at startup.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::kv::{parse_kv_file, DeployConfig};

/// File name of the deploy config inside `shared/`.
pub const CONFIG_FILE_NAME: &str = ".deploy-webhook";

/// Offset from the install directory to the `shared/` directory.
const INSTALL_RELATIVE_SHARED: &str = "../shared";

/// Directory under `$HOME` assumed to be the deployment root.
const HOME_GUESS_DIR: &str = "deploy";

/// Strategy for finding the deploy config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLocator {
    /// Read exactly this file.
    Explicit(PathBuf),
    /// `<install_dir>/../shared/.deploy-webhook`.
    InstallRelative { install_dir: PathBuf },
    /// `<home>/deploy/shared/.deploy-webhook`, then re-read from the
    /// `BASE_DIR` it names when that differs from the guess.
    HomeGuess { home: String },
}

impl ConfigLocator {
    /// First config path this strategy reads, if it has one.
    pub fn initial_path(&self) -> Option<PathBuf> {
        match self {
            ConfigLocator::Explicit(path) => Some(path.clone()),
            ConfigLocator::InstallRelative { install_dir } => Some(
                install_dir
                    .join(INSTALL_RELATIVE_SHARED)
                    .join(CONFIG_FILE_NAME),
            ),
            ConfigLocator::HomeGuess { home } => {
                home_guess(home).map(|base| config_path_for_base(&base))
            }
        }
    }

    /// Locate and parse the deploy config.
    ///
    /// Returns `NotFound` when the strategy has no usable path.
    pub fn load(&self) -> io::Result<DeployConfig> {
        let path = self.initial_path().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no config location available")
        })?;

        debug!(path = %path.display(), "deploy_config_reading");
        let config = parse_kv_file(&path)?;

        let ConfigLocator::HomeGuess { home } = self else {
            return Ok(config);
        };

        let guess = home_guess(home).unwrap_or_default();
        match config.base_dir() {
            Some(base) if base != guess.trim_end_matches('/') => {
                let relocated = config_path_for_base(base);
                info!(
                    guessed = %guess,
                    base_dir = %base,
                    path = %relocated.display(),
                    "deploy_config_relocated"
                );
                parse_kv_file(&relocated)
            }
            _ => Ok(config),
        }
    }
}

/// `BASE_DIR/shared/.deploy-webhook`.
pub fn config_path_for_base(base_dir: &str) -> PathBuf {
    Path::new(base_dir).join("shared").join(CONFIG_FILE_NAME)
}

fn home_guess(home: &str) -> Option<String> {
    if home.is_empty() {
        None
    } else {
        Some(format!("{}/{}", home.trim_end_matches('/'), HOME_GUESS_DIR))
    }
}
