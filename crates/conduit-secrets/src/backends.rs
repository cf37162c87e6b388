use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Keeps the crate's public trait free of an `async-trait` macro dependency neither the
/// teacher's secret-adjacent code nor the rest of this workspace otherwise needs — a
/// boxed-future shim is enough for the two backends this crate ships.
mod async_trait_shim {
    pub use std::future::Future;
    pub use std::pin::Pin;

    pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("io error reading secret store: {0}")]
    Io(String),
    #[error("secret store is not valid json: {0}")]
    InvalidJson(String),
}

/// A pluggable source of secret plaintext, selected by reference prefix
/// (`secret://`, `env://`, or a real deployment's platform-keychain backend).
pub trait SecretBackend: Send + Sync {
    fn resolve<'a>(
        &'a self,
        name: &'a str,
    ) -> async_trait_shim::BoxFuture<'a, Result<Option<String>, BackendError>>;
}

/// Reads values from a JSON file under the config directory, restricted to the owning
/// user. Real deployments should substitute a backend that calls into a platform keychain
/// (Keychain/DPAPI/libsecret); this one exists so the reference implementation has
/// somewhere durable to store a secret without inventing a vendor dependency.
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn load(&self) -> Result<HashMap<String, String>, BackendError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let value: Value =
                    serde_json::from_str(&contents).map_err(|e| BackendError::InvalidJson(e.to_string()))?;
                let map = value
                    .as_object()
                    .map(|obj| {
                        obj.iter()
                            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(map)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(BackendError::Io(e.to_string())),
        }
    }

    /// Writes a secret into the store, creating it with `0600` permissions on first write
    /// (unix only — on other platforms the OS default ACL applies).
    pub async fn put(&self, name: &str, plaintext: &str) -> Result<(), BackendError> {
        let mut map = self.load().await.unwrap_or_default();
        map.insert(name.to_string(), plaintext.to_string());
        let body = serde_json::to_string_pretty(&map).unwrap();
        tokio::fs::write(&self.path, body)
            .await
            .map_err(|e| BackendError::Io(e.to_string()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = tokio::fs::metadata(&self.path).await {
                let mut perms = metadata.permissions();
                perms.set_mode(0o600);
                let _ = tokio::fs::set_permissions(&self.path, perms).await;
            }
        }
        Ok(())
    }
}

impl SecretBackend for FileBackend {
    fn resolve<'a>(
        &'a self,
        name: &'a str,
    ) -> async_trait_shim::BoxFuture<'a, Result<Option<String>, BackendError>> {
        Box::pin(async move {
            let map = self.load().await?;
            Ok(map.get(name).cloned())
        })
    }
}

/// Resolves against the resolving process's own environment — useful for CI, where
/// injecting a value via the platform's native secret-manager env-var convention is
/// simpler than maintaining a file store.
pub struct EnvBackend;

impl SecretBackend for EnvBackend {
    fn resolve<'a>(
        &'a self,
        name: &'a str,
    ) -> async_trait_shim::BoxFuture<'a, Result<Option<String>, BackendError>> {
        Box::pin(async move { Ok(std::env::var(name).ok()) })
    }
}
