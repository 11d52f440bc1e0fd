//! Detached launch of `deploy.sh`.
//!
//! The deploy command runs under `nohup` in the background of a short-lived
//! `/bin/sh`, with its output appended to `BASE_DIR/shared/deploy.log`. The
//! shell prints `OK` once the background job is started and exits; the
//! deploy itself is never awaited.
//!
//! Every interpolated value goes through [`shell_quote`].

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

/// Script run for each deploy, relative to `BASE_DIR`.
pub const DEPLOY_SCRIPT: &str = "deploy.sh";

/// Log receiving the script's combined output, relative to `BASE_DIR`.
pub const DEPLOY_LOG: &str = "shared/deploy.log";

/// Body returned when the shell printed nothing.
pub const DEFAULT_RESPONSE: &str = "OK\n";

/// Shell that interprets the dispatch command line.
const OUTER_SHELL: &str = "/bin/sh";

/// Quote a value as a single POSIX shell word.
///
/// The value is wrapped in single quotes; embedded single quotes become
/// `'\''`. Nothing inside single quotes is special to the shell.
pub fn shell_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

/// Everything needed to launch one deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPlan {
    /// `HOME` for the script
    pub home: String,
    /// `BASE_DIR` for the script, exactly as configured
    pub base_dir: String,
    /// Login shell that runs the script
    pub shell: String,
}

impl DispatchPlan {
    pub fn new(home: impl Into<String>, base_dir: impl Into<String>, shell: impl Into<String>) -> Self {
        Self {
            home: home.into(),
            base_dir: base_dir.into(),
            shell: shell.into(),
        }
    }

    /// Deployment root with trailing slashes removed; `/` stays `/`.
    fn root(&self) -> &Path {
        let trimmed = self.base_dir.trim_end_matches('/');
        if trimmed.is_empty() && !self.base_dir.is_empty() {
            Path::new("/")
        } else {
            Path::new(trimmed)
        }
    }

    pub fn script_path(&self) -> PathBuf {
        self.root().join(DEPLOY_SCRIPT)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root().join(DEPLOY_LOG)
    }

    /// Whether `deploy.sh` exists as a regular file.
    pub fn script_exists(&self) -> bool {
        self.script_path().is_file()
    }

    /// The full `/bin/sh -c` command line.
    ///
    /// The login shell parses its `-c` argument again, so the script path
    /// is quoted once for it and once more for `/bin/sh`.
    pub fn command_line(&self) -> String {
        format!(
            "HOME={} BASE_DIR={} nohup {} -lc {} >> {} 2>&1 & echo OK",
            shell_quote(&self.home),
            shell_quote(&self.base_dir),
            shell_quote(&self.shell),
            shell_quote(&shell_quote(&self.script_path().to_string_lossy())),
            shell_quote(&self.log_path().to_string_lossy()),
        )
    }
}

/// Launch the deploy and return whatever the shell printed.
///
/// Returns once `/bin/sh` has backgrounded the script and exited.
pub async fn dispatch(plan: &DispatchPlan) -> io::Result<String> {
    let command_line = plan.command_line();
    debug!(command = %command_line, "deploy_command_built");

    let mut command = Command::new(OUTER_SHELL);
    command
        .arg("-c")
        .arg(&command_line)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(false);

    // Keep the deploy out of the listener's process group so a Ctrl+C on
    // the listener does not reach it.
    #[cfg(unix)]
    command.process_group(0);

    let output = command.output().await?;

    if !output.stderr.is_empty() {
        info!(
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "deploy_shell_stderr"
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if stdout.is_empty() {
        Ok(DEFAULT_RESPONSE.to_string())
    } else {
        Ok(stdout)
    }
}
