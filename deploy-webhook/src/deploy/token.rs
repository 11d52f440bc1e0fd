//! Deploy token verification.
//!
//! The presented token and the configured secret are each run through
//! HMAC-SHA256 under a fixed key and the tags compared with `verify_slice`,
//! which is constant-time. Comparison time depends on neither how many
//! leading bytes match nor whether the lengths differ.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Fixed key for the comparison MAC; it provides no secrecy.
const COMPARE_KEY: &[u8] = b"deploy-webhook/token-compare/v1";

/// Check a presented token against the configured secret.
///
/// The presented token is compared as raw bytes, so any header value that
/// carries the secret's exact UTF-8 encoding matches. An empty secret never
/// matches.
pub fn tokens_match(expected: &str, provided: &[u8]) -> bool {
    if expected.is_empty() {
        return false;
    }

    let (Some(expected_mac), Some(provided_mac)) = (keyed(expected.as_bytes()), keyed(provided)) else {
        return false;
    };

    let expected_tag = expected_mac.finalize().into_bytes();
    provided_mac.verify_slice(&expected_tag).is_ok()
}

/// Short, non-reversible identifier for a token, safe to log.
pub fn token_fingerprint(token: &[u8]) -> String {
    if token.is_empty() {
        return "none".to_string();
    }
    let digest = Sha256::digest(token);
    hex::encode(&digest[..4])
}

fn keyed(value: &[u8]) -> Option<HmacSha256> {
    match HmacSha256::new_from_slice(COMPARE_KEY) {
        Ok(mut mac) => {
            mac.update(value);
            Some(mac)
        }
        Err(_) => {
            warn!("token_compare_invalid_key");
            None
        }
    }
}
