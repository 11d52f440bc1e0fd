//! Marker-file rate limiting.
//!
//! The marker holds the unix time (seconds) of the last accepted request.
//! The whole read-check-write runs under an exclusive lock on the marker,
//! so two overlapping requests cannot both pass the gate.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fs4::fs_std::FileExt;
use tracing::{debug, warn};

/// File name of the marker inside `BASE_DIR/shared`.
pub const MARKER_FILE_NAME: &str = ".deploy-webhook.last";

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The request may proceed; its timestamp has been recorded.
    Allowed,
    /// Too soon after the last accepted request.
    Limited { retry_after: Duration },
}

/// Time-window gate backed by a single timestamp file.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    path: PathBuf,
    window: Duration,
}

impl RateLimiter {
    pub fn new(path: impl Into<PathBuf>, window: Duration) -> Self {
        Self {
            path: path.into(),
            window,
        }
    }

    /// Limiter using the default marker under `BASE_DIR/shared`.
    pub fn for_base_dir(base_dir: &str, window: Duration) -> Self {
        Self::new(
            Path::new(base_dir).join("shared").join(MARKER_FILE_NAME),
            window,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check the window at `now` (unix seconds) and record `now` if allowed.
    ///
    /// A missing or unreadable timestamp counts as "no previous request".
    pub fn check_and_record(&self, now: u64) -> io::Result<RateDecision> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let last = read_timestamp(&mut file, &self.path)?;
        let window = self.window.as_secs();

        if let Some(last) = last {
            let elapsed = now.saturating_sub(last);
            if elapsed < window {
                debug!(last, now, elapsed, window, "rate_limit_hit");
                return Ok(RateDecision::Limited {
                    retry_after: Duration::from_secs(window - elapsed),
                });
            }
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{}", now)?;
        file.sync_data()?;

        debug!(now, "rate_limit_recorded");
        Ok(RateDecision::Allowed)
    }
}

/// Current unix time in whole seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn read_timestamp(file: &mut File, path: &Path) -> io::Result<Option<u64>> {
    let mut raw = String::new();
    file.read_to_string(&mut raw)?;

    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    match raw.parse() {
        Ok(ts) => Ok(Some(ts)),
        Err(_) => {
            warn!(path = %path.display(), content = %raw, "rate_limit_marker_invalid");
            Ok(None)
        }
    }
}
