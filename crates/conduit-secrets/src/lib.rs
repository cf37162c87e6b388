//! Secret reference resolution (spec §4.4): opaque `secret://`/`env://` references in a
//! connector's env are resolved to plaintext immediately before spawning the child;
//! plaintext is never persisted.
//!
//! Grounded on `turbomcp-auth`'s pluggable-provider pattern (a small async trait picked by
//! a recognized prefix), applied here to secret backends instead of OAuth2 providers.

mod backends;

pub use backends::{EnvBackend, FileBackend, SecretBackend};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Outcome of resolving one connector's env block (spec §4.4 contract).
#[derive(Debug, Default)]
pub struct ResolvedEnv {
    pub success: bool,
    pub env_resolved: HashMap<String, String>,
    pub errors: Vec<String>,
}

/// Resolves every `secret://` / `env://` reference in `env`, passing through any value
/// that does not match a recognized scheme. An unknown scheme is reported as an error,
/// never silently dropped.
pub async fn resolve_env_secrets(
    env: &HashMap<String, String>,
    connector_id: &str,
    config_dir: &Path,
) -> ResolvedEnv {
    let file_backend = FileBackend::new(config_dir.join("secrets.json"));
    let env_backend = EnvBackend;

    let mut out = ResolvedEnv {
        success: true,
        ..Default::default()
    };

    for (key, value) in env {
        match classify(value) {
            Reference::Secret(name) => match file_backend.resolve(&name).await {
                Ok(Some(plaintext)) => {
                    out.env_resolved.insert(key.clone(), plaintext);
                }
                Ok(None) => {
                    out.success = false;
                    out.errors
                        .push(format!("{connector_id}: secret '{name}' not found for env key '{key}'"));
                }
                Err(e) => {
                    out.success = false;
                    out.errors.push(format!("{connector_id}: {key}: {e}"));
                }
            },
            Reference::Env(name) => match env_backend.resolve(&name).await {
                Ok(Some(plaintext)) => {
                    out.env_resolved.insert(key.clone(), plaintext);
                }
                Ok(None) => {
                    out.success = false;
                    out.errors
                        .push(format!("{connector_id}: process env var '{name}' not set for env key '{key}'"));
                }
                Err(e) => {
                    out.success = false;
                    out.errors.push(format!("{connector_id}: {key}: {e}"));
                }
            },
            Reference::UnknownScheme(scheme) => {
                out.success = false;
                out.errors.push(format!(
                    "{connector_id}: env key '{key}' uses unrecognized secret scheme '{scheme}'"
                ));
            }
            Reference::Literal => {
                out.env_resolved.insert(key.clone(), value.clone());
            }
        }
    }

    if !out.success {
        warn!(connector_id, errors = out.errors.len(), "secret resolution had failures");
    }
    out
}

enum Reference {
    Secret(String),
    Env(String),
    UnknownScheme(String),
    Literal,
}

fn classify(value: &str) -> Reference {
    if let Some(name) = value.strip_prefix("secret://") {
        Reference::Secret(name.to_string())
    } else if let Some(name) = value.strip_prefix("env://") {
        Reference::Env(name.to_string())
    } else if let Some(idx) = value.find("://") {
        if looks_like_scheme(&value[..idx]) {
            Reference::UnknownScheme(value[..idx].to_string())
        } else {
            Reference::Literal
        }
    } else {
        Reference::Literal
    }
}

fn looks_like_scheme(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-')
}

/// A type-erased backend, for callers that want to plug in a platform keychain without
/// depending on this crate's concrete types.
pub type DynBackend = Arc<dyn SecretBackend>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn passthrough_for_literal_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = HashMap::new();
        env.insert("TOKEN".to_string(), "plain-value".to_string());
        let resolved = resolve_env_secrets(&env, "c1", dir.path()).await;
        assert!(resolved.success);
        assert_eq!(resolved.env_resolved.get("TOKEN").unwrap(), "plain-value");
    }

    #[tokio::test]
    async fn unknown_scheme_is_reported_not_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = HashMap::new();
        env.insert("TOKEN".to_string(), "dpapi://blob".to_string());
        let resolved = resolve_env_secrets(&env, "c1", dir.path()).await;
        assert!(!resolved.success);
        assert_eq!(resolved.errors.len(), 1);
        assert!(!resolved.env_resolved.contains_key("TOKEN"));
    }

    #[tokio::test]
    async fn resolves_env_backend_from_process_environment() {
        std::env::set_var("CONDUIT_TEST_SECRET", "sekret");
        let dir = tempfile::tempdir().unwrap();
        let mut env = HashMap::new();
        env.insert("TOKEN".to_string(), "env://CONDUIT_TEST_SECRET".to_string());
        let resolved = resolve_env_secrets(&env, "c1", dir.path()).await;
        assert!(resolved.success);
        assert_eq!(resolved.env_resolved.get("TOKEN").unwrap(), "sekret");
    }
}
