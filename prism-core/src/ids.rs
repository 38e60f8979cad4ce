//! Deterministic content-derived identifiers
//!
//! Every canonical object id is a sha256 over a stable
//! `prefix:part:part:...` tuple, so re-processing identical input
//! always yields the same id and merges instead of duplicating.

use sha2::{Digest, Sha256};

/// Hex sha256 of arbitrary text.
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Stable id from a prefix and key parts. Empty parts are skipped so
/// optional fields do not shift the tuple.
pub fn stable_id(prefix: &str, parts: &[&str]) -> String {
    let mut raw = String::from(prefix);
    for part in parts {
        if part.is_empty() {
            continue;
        }
        raw.push(':');
        raw.push_str(part);
    }
    sha256_hex(&raw)
}

/// True when `text` looks like a well-formed hex sha256.
pub fn is_sha256_hex(text: &str) -> bool {
    text.len() == 64 && text.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_id_is_deterministic() {
        let a = stable_id("artifact", &["reddit", "abc123", "https://example.com"]);
        let b = stable_id("artifact", &["reddit", "abc123", "https://example.com"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_stable_id_skips_empty_parts() {
        let with_empty = stable_id("signal", &["DOMAIN", "", "example.com"]);
        let without = stable_id("signal", &["DOMAIN", "example.com"]);
        assert_eq!(with_empty, without);
    }

    #[test]
    fn test_stable_id_differs_by_prefix() {
        assert_ne!(stable_id("entity", &["x"]), stable_id("signal", &["x"]));
    }

    #[test]
    fn test_is_sha256_hex() {
        assert!(is_sha256_hex(&sha256_hex("payload")));
        assert!(!is_sha256_hex("deadbeef"));
        assert!(!is_sha256_hex(&"z".repeat(64)));
    }
}
