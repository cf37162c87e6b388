//! Bearer token auth (spec §4.10): stored `sha256:<hex>` hashes, constant-time compare.
//!
//! Adapted from `turbomcp-auth`'s `validate_api_key`/`validate_api_key_multiple`
//! (`crates/turbomcp-auth/src/api_key_validation.rs`), swapped from BLAKE3 to SHA-256 to
//! match the wire format the spec requires for stored token hashes, and carrying a
//! permission list per token instead of returning a bare bool.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

pub const HASH_PREFIX: &str = "sha256:";

pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{HASH_PREFIX}{}", hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEntry {
    pub hash: String,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    #[default]
    None,
    Bearer,
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub tokens: Vec<TokenEntry>,
}

impl AuthConfig {
    /// Finds the token entry matching `provided`, comparing every stored hash in
    /// constant time regardless of which one (if any) matches — an attacker measuring
    /// response latency learns nothing about which token index was closest.
    pub fn authenticate(&self, provided: &str) -> Option<&TokenEntry> {
        let provided_hash = hash_token(provided);
        let provided_digest = provided_hash.as_bytes();
        let mut matched: Option<&TokenEntry> = None;
        for entry in &self.tokens {
            let is_match: bool = entry
                .hash
                .as_bytes()
                .ct_eq(provided_digest)
                .into();
            if is_match {
                matched = Some(entry);
            }
        }
        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_token_is_deterministic_and_prefixed() {
        let h = hash_token("abc123");
        assert!(h.starts_with(HASH_PREFIX));
        assert_eq!(h, hash_token("abc123"));
    }

    #[test]
    fn authenticate_finds_matching_entry() {
        let config = AuthConfig {
            mode: AuthMode::Bearer,
            tokens: vec![TokenEntry {
                hash: hash_token("secret-token"),
                permissions: vec!["mcp:*".to_string()],
            }],
        };
        let entry = config.authenticate("secret-token").unwrap();
        assert_eq!(entry.permissions, vec!["mcp:*".to_string()]);
        assert!(config.authenticate("wrong-token").is_none());
    }
}
