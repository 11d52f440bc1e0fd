//! Line-oriented key=value config parsing.
//!
//! Format:
//! - `KEY=VALUE`, split on the first `=`, both sides trimmed
//! - `#` and `;` start comment lines; blank lines are skipped
//! - a value wrapped in matching `"` or `'` is unwrapped
//! - the last occurrence of a key wins

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

/// Key holding the shared deploy secret.
pub const DEPLOY_TOKEN_KEY: &str = "DEPLOY_TOKEN";

/// Key holding the absolute deployment root.
pub const BASE_DIR_KEY: &str = "BASE_DIR";

/// Parsed deploy configuration.
///
/// Read fresh for every request; nothing in this crate writes it back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployConfig {
    values: HashMap<String, String>,
}

impl DeployConfig {
    /// Raw value for a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// The shared secret, if present and non-empty.
    pub fn token(&self) -> Option<&str> {
        self.get(DEPLOY_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// The deployment root exactly as configured, if present and non-empty.
    pub fn raw_base_dir(&self) -> Option<&str> {
        self.get(BASE_DIR_KEY).filter(|b| !b.is_empty())
    }

    /// The deployment root without trailing slashes, if present and non-empty.
    ///
    /// A value of `/` is kept as-is rather than collapsing to nothing.
    pub fn base_dir(&self) -> Option<&str> {
        let raw = self.get(BASE_DIR_KEY)?;
        if raw.is_empty() {
            return None;
        }
        let trimmed = raw.trim_end_matches('/');
        if trimmed.is_empty() {
            Some("/")
        } else {
            Some(trimmed)
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Parse config text.
pub fn parse_kv_str(content: &str) -> DeployConfig {
    let mut values = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };

        let value = strip_quotes(strip_quotes(value.trim(), '"'), '\'');
        values.insert(key.trim().to_string(), value.to_string());
    }

    DeployConfig { values }
}

/// Read and parse a config file.
pub fn parse_kv_file(path: &Path) -> io::Result<DeployConfig> {
    let content = fs::read_to_string(path)?;
    Ok(parse_kv_str(&content))
}

/// Remove one pair of matching `quote` characters around a value.
fn strip_quotes(value: &str, quote: char) -> &str {
    value
        .strip_prefix(quote)
        .and_then(|v| v.strip_suffix(quote))
        .unwrap_or(value)
}
