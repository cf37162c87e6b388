//! One-shot `connect -> initialize -> call/list -> close` adapter (spec §4.7).
//!
//! Grounded on `turbomcp-proxy`'s `CapabilityRouter` (introspect/call/list shape),
//! generalized from a long-lived cached backend connection into a fresh per-invocation
//! session whose connection is guaranteed to close on every return path — including a
//! panicking handler — via an RAII guard, the same emphasis the teacher's router places on
//! always releasing the backend.

use conduit_core::{CoreError, CoreResult, Direction as CoreDirection, EventKind};
use conduit_store::Store;
use conduit_transport::{Direction as WireDirection, StdioConfig, StdioTransport};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const PROTOCOL_VERSION: &str = "2024-11-05";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ToolBridge {
    store: Store,
}

impl ToolBridge {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn list_tools(&self, connector_id: &str, config: StdioConfig) -> CoreResult<Vec<Value>> {
        let value = self.call_method(connector_id, config, "tools/list", json!({})).await?;
        Ok(value
            .get("tools")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    pub async fn call_tool(
        &self,
        connector_id: &str,
        config: StdioConfig,
        name: &str,
        arguments: Value,
    ) -> CoreResult<Value> {
        self.call_method(connector_id, config, "tools/call", json!({"name": name, "arguments": arguments}))
            .await
    }

    /// Opens a fresh session, issues one arbitrary JSON-RPC request, and closes. Used for
    /// `resources/list`, `resources/read`, and any other single-shot upstream method.
    pub async fn call_method(
        &self,
        connector_id: &str,
        config: StdioConfig,
        method: &str,
        params: Value,
    ) -> CoreResult<Value> {
        let session = Session::open(&self.store, connector_id, config).await?;
        let result = session.transport.call(method, params, DEFAULT_TIMEOUT).await;
        let (outcome, exit_reason) = match result {
            Ok(value) => (Ok(value), "normal"),
            Err(e) => (Err(CoreError::from(e)), "error"),
        };
        session.close(exit_reason).await;
        outcome
    }
}

/// One stdio session, recording every observed frame to the event store and guaranteeing
/// the child process is reaped even if the caller never reaches the normal `close()` path.
struct Session {
    transport: StdioTransport,
    store: Store,
    session_id: String,
    closed: std::sync::atomic::AtomicBool,
}

impl Session {
    async fn open(store: &Store, connector_id: &str, config: StdioConfig) -> CoreResult<Arc<Self>> {
        let session_id = store
            .create_session(connector_id, None, None)
            .await
            .map_err(CoreError::from)?;
        let recorder_store = store.clone();
        let recorder_session = session_id.clone();
        let observer: conduit_transport::MessageObserver = Arc::new(move |dir, raw| {
            let store = recorder_store.clone();
            let session_id = recorder_session.clone();
            let raw = raw.to_string();
            tokio::spawn(async move {
                record_frame(&store, &session_id, dir, &raw).await;
            });
        });

        let transport = StdioTransport::connect_with_observer(config, Some(observer))
            .await
            .map_err(CoreError::from)?;

        let session = Arc::new(Self {
            transport,
            store: store.clone(),
            session_id,
            closed: std::sync::atomic::AtomicBool::new(false),
        });

        if let Err(e) = handshake(&session.transport).await {
            session.close("error").await;
            return Err(e);
        }

        Ok(session)
    }

    async fn close(&self, exit_reason: &str) {
        use std::sync::atomic::Ordering;
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.transport.close().await;
        if let Err(e) = self.store.end_session(&self.session_id, exit_reason).await {
            warn!(error = %e, "failed to record session end");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        use std::sync::atomic::Ordering;
        if !self.closed.swap(true, Ordering::SeqCst) && !self.transport.is_closed() {
            // A panicking caller skipped the normal `close()` path. The transport was
            // built with `kill_on_drop(true)`, so the child is still reaped here even
            // without an async `close()` call — this just flags it happened.
            warn!(session_id = %self.session_id, "session dropped without an explicit close");
        }
    }
}

async fn handshake(transport: &StdioTransport) -> CoreResult<()> {
    transport
        .call(
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "clientInfo": {"name": "conduit-toolbridge", "version": env!("CARGO_PKG_VERSION")},
                "capabilities": {},
            }),
            DEFAULT_TIMEOUT,
        )
        .await
        .map_err(CoreError::from)?;
    transport
        .notify("notifications/initialized", json!({}))
        .await
        .map_err(CoreError::from)?;
    Ok(())
}

async fn record_frame(store: &Store, session_id: &str, dir: WireDirection, raw: &str) {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return,
    };
    let kind = conduit_protocol::classify(&value);
    let hash = conduit_protocol::payload_hash(raw);
    let summary = conduit_protocol::summarize(&value);
    let direction = match dir {
        WireDirection::Outbound => CoreDirection::ClientToServer,
        WireDirection::Inbound => CoreDirection::ServerToClient,
    };
    let rpc_id = value.get("id").map(|v| v.to_string());
    if let Err(e) = store
        .save_event(
            session_id,
            rpc_id.as_deref(),
            direction.as_str(),
            event_kind_str(kind),
            Some(&summary),
            Some(&hash),
            Some(raw),
            None,
        )
        .await
    {
        warn!(error = %e, "failed to record frame event");
    }
}

fn event_kind_str(kind: EventKind) -> &'static str {
    kind.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_command_surfaces_as_core_error() {
        let store = Store::open_in_memory().await.unwrap();
        let bridge = ToolBridge::new(store);
        let config = StdioConfig {
            command: "this-binary-does-not-exist-anywhere".into(),
            args: vec![],
            env: Default::default(),
            cwd: None,
        };
        let result = bridge.list_tools("missing", config).await;
        assert!(result.is_err());
    }
}
