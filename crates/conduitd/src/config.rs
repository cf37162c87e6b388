//! Root configuration document (spec §6): `version=1`, `connectors[]`, optional
//! `retention` and `inscriber`. TOML on disk by default, matching the teacher's `config`
//! crate usage (`turbomcp-server`'s layered config-struct conventions) — loaded here with
//! plain `toml`+`serde` since no layered env-override surface is needed yet.

use conduit_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RootConfig {
    pub version: u32,
    #[serde(default)]
    pub connectors: Vec<ConnectorEntry>,
    #[serde(default)]
    pub retention: Option<conduit_retention::RetentionPolicy>,
    /// Reserved for a future event-inscriber/sink configuration; accepted and round-tripped
    /// but not otherwise consumed by this binary.
    #[serde(default)]
    pub inscriber: Option<toml::Value>,
    #[serde(default)]
    pub gateway: Option<GatewayDocument>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectorEntry {
    pub id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub transport: TransportEntry,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TransportEntry {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default)]
        cwd: Option<String>,
    },
    RpcHttp {
        url: String,
    },
    RpcSse {
        url: String,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayDocument {
    #[serde(default)]
    pub bind: Option<String>,
    #[serde(default)]
    pub hide_not_found: bool,
    #[serde(default)]
    pub tokens: Vec<GatewayToken>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayToken {
    pub hash: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// A connector id restricted to `[A-Za-z0-9_-]+` per spec §6.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl RootConfig {
    pub fn load(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::validation(format!("cannot read config '{}': {e}", path.display())))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| CoreError::validation(format!("malformed config '{}': {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CoreResult<()> {
        if self.version != 1 {
            return Err(CoreError::validation(format!(
                "unsupported config version {} (expected 1)",
                self.version
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for connector in &self.connectors {
            if !is_valid_id(&connector.id) {
                return Err(CoreError::validation(format!(
                    "connector id '{}' must match [A-Za-z0-9_-]+",
                    connector.id
                )));
            }
            if !seen.insert(connector.id.clone()) {
                return Err(CoreError::validation(format!("duplicate connector id '{}'", connector.id)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_stdio_connector() {
        let doc = r#"
            version = 1

            [[connectors]]
            id = "fs"
            [connectors.transport]
            type = "stdio"
            command = "mcp-server-fs"
            args = ["--root", "/tmp"]
        "#;
        let config: RootConfig = toml::from_str(doc).unwrap();
        config.validate().unwrap();
        assert_eq!(config.connectors.len(), 1);
        assert_eq!(config.connectors[0].id, "fs");
        assert!(config.connectors[0].enabled);
    }

    #[test]
    fn rejects_duplicate_connector_ids() {
        let doc = r#"
            version = 1
            [[connectors]]
            id = "fs"
            [connectors.transport]
            type = "stdio"
            command = "a"
            [[connectors]]
            id = "fs"
            [connectors.transport]
            type = "stdio"
            command = "b"
        "#;
        let config: RootConfig = toml::from_str(doc).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_invalid_connector_id() {
        let doc = r#"
            version = 1
            [[connectors]]
            id = "has space"
            [connectors.transport]
            type = "stdio"
            command = "a"
        "#;
        let config: RootConfig = toml::from_str(doc).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unsupported_version() {
        let doc = "version = 2\n";
        let config: RootConfig = toml::from_str(doc).unwrap();
        assert!(config.validate().is_err());
    }
}
