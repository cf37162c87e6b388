//! Aggregating JSON-RPC proxy (spec §4.8): publishes a namespaced union of tools across
//! every enabled MCP connector behind a single endpoint.
//!
//! Grounded on `turbomcp-proxy`'s `CapabilityRouter` (`crates/turbomcp-proxy/src/proxy/router.rs`):
//! the same "look up backend, delegate, translate the result" shape, generalized from a
//! single 1:1 frontend<->backend pairing into a 1:N fan-out across every enabled connector,
//! and from a long-lived cached backend connection into a queued one-shot call per request
//! (spec §4.7/§4.9).

mod runtime_state;

pub use runtime_state::{ClientStats, ConnectorSummary, RuntimeState};

use conduit_core::{CoreError, CoreResult, TargetType};
use conduit_queue::{EnqueueOutcome, Handler, QueueManager};
use conduit_registry::Registry;
use conduit_store::Store;
use conduit_toolbridge::ToolBridge;
use conduit_transport::StdioConfig;
use futures::future::join_all;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const NAMESPACE_SEPARATOR: &str = "__";
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

pub fn namespaced_name(connector_id: &str, tool_name: &str) -> String {
    format!("{connector_id}{NAMESPACE_SEPARATOR}{tool_name}")
}

/// Splits on the *first* `__`; everything after belongs to the upstream tool name even if
/// it contains further `__` (spec §4.8 namespace rule).
pub fn split_namespaced_name(name: &str) -> Option<(&str, &str)> {
    name.split_once(NAMESPACE_SEPARATOR)
}

pub struct AggregatingProxy {
    registry: Registry,
    bridge: Arc<ToolBridge>,
    queues: Arc<QueueManager>,
    config_dir: PathBuf,
}

impl AggregatingProxy {
    pub fn new(store: Store, config_dir: impl Into<PathBuf>, queues: Arc<QueueManager>) -> Self {
        Self {
            registry: Registry::new(store.clone()),
            bridge: Arc::new(ToolBridge::new(store)),
            queues,
            config_dir: config_dir.into(),
        }
    }

    async fn resolved_config(&self, connector_id: &str) -> CoreResult<StdioConfig> {
        let target = self.registry.get(connector_id).await?;
        if !target.enabled {
            return Err(CoreError::forbidden(format!("connector '{connector_id}' is disabled")));
        }
        let raw: Value = serde_json::from_str(&target.config)
            .map_err(|e| CoreError::internal(format!("stored config for '{connector_id}' is not valid JSON: {e}")))?;
        let mut config: StdioConfig = serde_json::from_value(raw)
            .map_err(|e| CoreError::validation(format!("connector '{connector_id}' is not a stdio connector: {e}")))?;

        let resolved = conduit_secrets::resolve_env_secrets(&config.env, connector_id, &self.config_dir).await;
        if !resolved.success {
            return Err(CoreError::internal(resolved.errors.join("; ")));
        }
        config.env = resolved.env_resolved;
        Ok(config)
    }

    /// `initialize`: returns capability envelope and server info (spec §4.8).
    pub fn initialize(&self) -> Value {
        json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}, "resources": {}},
            "serverInfo": {"name": "conduit-proxy", "version": env!("CARGO_PKG_VERSION")},
        })
    }

    /// `tools/list`: concurrent fan-out, partial failure tolerated — unreachable connectors
    /// are logged and omitted, never fail the whole call.
    pub async fn list_tools(&self) -> CoreResult<Vec<Value>> {
        let connectors = self.registry.list(Some(TargetType::Connector), true).await?;
        let fetches = connectors.into_iter().map(|target| async move {
            let config = match self.resolved_config(&target.id).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(connector = %target.id, error = %e, "skipping connector for tools/list");
                    return Vec::new();
                }
            };
            match self.bridge.list_tools(&target.id, config).await {
                Ok(tools) => tools
                    .into_iter()
                    .filter_map(|tool| namespace_tool(&target.id, tool))
                    .collect(),
                Err(e) => {
                    warn!(connector = %target.id, error = %e, "connector unreachable for tools/list");
                    Vec::new()
                }
            }
        });
        Ok(join_all(fetches).await.into_iter().flatten().collect())
    }

    /// `tools/call`: strip the namespace, enqueue onto that connector's FIFO, execute.
    pub async fn call_tool(&self, namespaced: &str, arguments: Value) -> CoreResult<EnqueueOutcome> {
        let (connector_id, tool_name) = split_namespaced_name(namespaced)
            .ok_or_else(|| CoreError::validation(format!("'{namespaced}' is not a namespaced tool name")))?;
        let connector_id = connector_id.to_string();
        let tool_name = tool_name.to_string();

        let config = self.resolved_config(&connector_id).await?;
        let bridge = Arc::clone(&self.bridge);
        let queue = self.queues.queue_for(&connector_id);

        let handler: Handler = Box::new(move |_cancel| {
            Box::pin(async move { bridge.call_tool(&connector_id, config, &tool_name, arguments).await })
        });
        queue.enqueue(DEFAULT_CALL_TIMEOUT, handler).await
    }

    /// Dispatches an arbitrary JSON-RPC method to a single named connector, queued through
    /// that connector's FIFO. Used by the HTTP gateway's `POST /mcp` (spec §4.10), which
    /// addresses one connector per request rather than fanning out across all of them.
    pub async fn call_connector_method(
        &self,
        connector_id: &str,
        method: &str,
        params: Value,
    ) -> CoreResult<EnqueueOutcome> {
        let config = self.resolved_config(connector_id).await?;
        let bridge = Arc::clone(&self.bridge);
        let queue = self.queues.queue_for(connector_id);
        let connector_id = connector_id.to_string();
        let method = method.to_string();
        let handler: Handler = Box::new(move |_cancel| {
            Box::pin(async move { bridge.call_method(&connector_id, config, &method, params).await })
        });
        queue.enqueue(DEFAULT_CALL_TIMEOUT, handler).await
    }

    /// `resources/list`: same fan-out shape as `tools/list`, namespaced by connector.
    pub async fn list_resources(&self) -> CoreResult<Vec<Value>> {
        let connectors = self.registry.list(Some(TargetType::Connector), true).await?;
        let fetches = connectors.into_iter().map(|target| async move {
            let config = match self.resolved_config(&target.id).await {
                Ok(c) => c,
                Err(_) => return Vec::new(),
            };
            match self
                .bridge
                .call_method(&target.id, config, "resources/list", json!({}))
                .await
            {
                Ok(value) => value
                    .get("resources")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|r| namespace_resource(&target.id, r))
                    .collect(),
                Err(_) => Vec::new(),
            }
        });
        Ok(join_all(fetches).await.into_iter().flatten().collect())
    }

    pub async fn read_resource(&self, connector_id: &str, uri: &str) -> CoreResult<EnqueueOutcome> {
        let config = self.resolved_config(connector_id).await?;
        let bridge = Arc::clone(&self.bridge);
        let queue = self.queues.queue_for(connector_id);
        let connector_id = connector_id.to_string();
        let uri = uri.to_string();
        let handler: Handler = Box::new(move |_cancel| {
            Box::pin(async move {
                bridge
                    .call_method(&connector_id, config, "resources/read", json!({"uri": uri}))
                    .await
            })
        });
        queue.enqueue(DEFAULT_CALL_TIMEOUT, handler).await
    }

    /// `ui/initialize`: issues a short-lived bridge token. The envelope it travels in
    /// (`_bridge`) is audit-only and MUST be stripped before any upstream forward.
    pub fn ui_initialize(&self) -> Value {
        let token = conduit_core::new_session_id();
        json!({"_bridge": {"token": token, "issuedAt": conduit_core::now_rfc3339()}})
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

/// Strips the `_bridge` envelope a UI-originated call may carry before it reaches an
/// upstream connector (spec §4.8, `ui/initialize`).
pub fn strip_bridge_envelope(mut params: Value) -> Value {
    if let Value::Object(ref mut map) = params {
        map.remove("_bridge");
    }
    params
}

fn namespace_tool(connector_id: &str, mut tool: Value) -> Option<Value> {
    let obj = tool.as_object_mut()?;
    let name = obj.get("name")?.as_str()?.to_string();
    obj.insert("name".to_string(), Value::String(namespaced_name(connector_id, &name)));
    Some(tool)
}

fn namespace_resource(connector_id: &str, mut resource: Value) -> Option<Value> {
    let obj = resource.as_object_mut()?;
    let uri = obj.get("uri")?.as_str()?.to_string();
    obj.insert("uri".to_string(), Value::String(namespaced_name(connector_id, &uri)));
    Some(resource)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_roundtrips_simple_name() {
        let ns = namespaced_name("fs", "read_file");
        assert_eq!(ns, "fs__read_file");
        assert_eq!(split_namespaced_name(&ns), Some(("fs", "read_file")));
    }

    #[test]
    fn split_keeps_further_separators_in_the_tool_half() {
        let (connector, tool) = split_namespaced_name("fs__a__b__c").unwrap();
        assert_eq!(connector, "fs");
        assert_eq!(tool, "a__b__c");
    }

    #[test]
    fn strip_bridge_envelope_removes_only_that_key() {
        let params = json!({"_bridge": {"token": "x"}, "name": "read_file"});
        let stripped = strip_bridge_envelope(params);
        assert!(stripped.get("_bridge").is_none());
        assert_eq!(stripped.get("name").unwrap(), "read_file");
    }

    #[tokio::test]
    async fn list_tools_returns_empty_when_no_connectors_registered() {
        let store = Store::open_in_memory().await.unwrap();
        let queues = Arc::new(QueueManager::new(Default::default()));
        let dir = tempfile::tempdir().unwrap();
        let proxy = AggregatingProxy::new(store, dir.path(), queues);
        let tools = proxy.list_tools().await.unwrap();
        assert!(tools.is_empty());
    }

    #[tokio::test]
    async fn call_tool_rejects_non_namespaced_name() {
        let store = Store::open_in_memory().await.unwrap();
        let queues = Arc::new(QueueManager::new(Default::default()));
        let dir = tempfile::tempdir().unwrap();
        let proxy = AggregatingProxy::new(store, dir.path(), queues);
        let err = proxy.call_tool("not_namespaced", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
