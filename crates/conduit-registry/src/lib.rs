//! Target registry (spec §4.3): unified connector/agent CRUD enforcing the
//! `type<->protocol` invariant, plus the ad-hoc connector-import shapes from spec §6.

mod import;

pub use import::{import_connectors, ImportError};

use conduit_core::{CoreError, CoreResult, TargetProtocol, TargetType};
use conduit_store::{Store, Target};
use serde_json::Value;

#[derive(Clone)]
pub struct Registry {
    store: Store,
}

impl Registry {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        id: &str,
        target_type: TargetType,
        protocol: TargetProtocol,
        name: Option<&str>,
        config: Value,
    ) -> CoreResult<()> {
        if !target_type.matches(protocol) {
            return Err(CoreError::validation(
                "target type and protocol must agree: connector<->mcp, agent<->a2a",
            ));
        }
        if self.store.get_target(id).await.is_ok() {
            return Err(CoreError::validation(format!("target '{id}' already exists")));
        }
        let target = Target {
            id: id.to_string(),
            target_type: type_str(target_type).to_string(),
            protocol: protocol_str(protocol).to_string(),
            name: name.map(str::to_string),
            enabled: true,
            created_at: conduit_core::now_rfc3339(),
            updated_at: None,
            config: config.to_string(),
        };
        self.store.upsert_target(&target).await.map_err(Into::into)
    }

    pub async fn get(&self, id: &str) -> CoreResult<Target> {
        self.store
            .get_target(id)
            .await
            .map_err(|_| CoreError::not_found(format!("target '{id}' not found")))
    }

    pub async fn get_by_prefix(&self, prefix: &str) -> CoreResult<Target> {
        self.store
            .find_target_by_prefix(prefix)
            .await
            .map_err(|_| CoreError::not_found(format!("no target matching prefix '{prefix}'")))
    }

    pub async fn list(&self, target_type: Option<TargetType>, enabled_only: bool) -> CoreResult<Vec<Target>> {
        let type_str = target_type.map(type_str);
        self.store
            .list_targets(type_str, enabled_only)
            .await
            .map_err(Into::into)
    }

    pub async fn set_enabled(&self, id: &str, enabled: bool) -> CoreResult<()> {
        let mut target = self.get(id).await?;
        target.enabled = enabled;
        target.updated_at = Some(conduit_core::now_rfc3339());
        self.store.upsert_target(&target).await.map_err(Into::into)
    }

    pub async fn delete(&self, id: &str) -> CoreResult<()> {
        self.get(id).await?;
        self.store.delete_target(id).await.map_err(Into::into)
    }
}

fn type_str(t: TargetType) -> &'static str {
    match t {
        TargetType::Connector => "connector",
        TargetType::Agent => "agent",
    }
}

fn protocol_str(p: TargetProtocol) -> &'static str {
    match p {
        TargetProtocol::Mcp => "mcp",
        TargetProtocol::A2a => "a2a",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn rejects_mismatched_type_and_protocol() {
        let store = Store::open_in_memory().await.unwrap();
        let registry = Registry::new(store);
        let err = registry
            .create("bad", TargetType::Connector, TargetProtocol::A2a, None, json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn create_list_disable_roundtrip() {
        let store = Store::open_in_memory().await.unwrap();
        let registry = Registry::new(store);
        registry
            .create("fs", TargetType::Connector, TargetProtocol::Mcp, Some("filesystem"), json!({}))
            .await
            .unwrap();
        let all = registry.list(None, false).await.unwrap();
        assert_eq!(all.len(), 1);

        registry.set_enabled("fs", false).await.unwrap();
        let enabled = registry.list(None, true).await.unwrap();
        assert!(enabled.is_empty());
    }

    #[tokio::test]
    async fn duplicate_id_rejected() {
        let store = Store::open_in_memory().await.unwrap();
        let registry = Registry::new(store);
        registry
            .create("fs", TargetType::Connector, TargetProtocol::Mcp, None, json!({}))
            .await
            .unwrap();
        let err = registry
            .create("fs", TargetType::Connector, TargetProtocol::Mcp, None, json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
