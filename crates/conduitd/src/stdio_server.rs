//! Local JSON-RPC server loop over stdio (spec §4.8, §6): one line in, one line out.
//! Stdout carries JSON-RPC exclusively; every diagnostic goes to stderr via `tracing`
//! (spec §1.1 ambient logging note), matching the teacher's `turbomcp-stdio` framing
//! discipline of never interleaving log output with the wire protocol.

use conduit_core::CoreError;
use conduit_proxy::{split_namespaced_name, strip_bridge_envelope, AggregatingProxy};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Maps a `CoreError` kind to a JSON-RPC 2.0 error code (spec §7's kind table read
/// against the standard JSON-RPC reserved range plus an application range for the rest).
fn error_code(err: &CoreError) -> i64 {
    match err {
        CoreError::Upstream { code, .. } => *code,
        CoreError::Validation(_) => -32602,
        CoreError::NotFound(_) => -32601,
        CoreError::Forbidden(_) => -32001,
        CoreError::QueueFull => -32002,
        CoreError::Timeout(_) => -32003,
        CoreError::TransportClosed(_) => -32004,
        CoreError::Internal(_) | CoreError::Io(_) | CoreError::Json(_) => -32603,
        _ => -32603,
    }
}

fn error_response(id: Value, err: &CoreError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": error_code(err), "message": err.sanitize()},
    })
}

fn ok_response(id: Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

/// Runs until stdin closes (the usual way an upstream-launched child is told to exit).
pub async fn serve(proxy: Arc<AggregatingProxy>) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Value>(&line) {
            Ok(request) => dispatch(&proxy, request).await,
            Err(e) => Some(error_response(Value::Null, &CoreError::validation(format!("invalid JSON: {e}")))),
        };
        if let Some(response) = response {
            let mut buf = serde_json::to_vec(&response).unwrap_or_default();
            buf.push(b'\n');
            stdout.write_all(&buf).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

/// Dispatches one parsed request. Returns `None` for notifications (no `id`), per
/// JSON-RPC 2.0 — the caller never expects a reply to those.
async fn dispatch(proxy: &Arc<AggregatingProxy>, request: Value) -> Option<Value> {
    let id = request.get("id").cloned();
    let method = request.get("method").and_then(Value::as_str)?.to_string();
    let params = strip_bridge_envelope(request.get("params").cloned().unwrap_or(json!({})));

    let Some(id) = id else {
        tracing::debug!(%method, "dropping notification on the stdio proxy surface");
        return None;
    };

    let result = match method.as_str() {
        "initialize" => Ok(proxy.initialize()),
        "ui/initialize" => Ok(proxy.ui_initialize()),
        "tools/list" => proxy.list_tools().await.map(|tools| json!({"tools": tools})),
        "tools/call" => call_tool(proxy, params).await,
        "resources/list" => proxy.list_resources().await.map(|resources| json!({"resources": resources})),
        "resources/read" => read_resource(proxy, params).await,
        other => Err(CoreError::validation(format!("unknown method '{other}'"))),
    };

    Some(match result {
        Ok(value) => ok_response(id, value),
        Err(e) => error_response(id, &e),
    })
}

async fn call_tool(proxy: &Arc<AggregatingProxy>, params: Value) -> Result<Value, CoreError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::validation("tools/call requires a 'name'"))?;
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
    let outcome = proxy.call_tool(name, arguments).await?;
    outcome.result
}

async fn read_resource(proxy: &Arc<AggregatingProxy>, params: Value) -> Result<Value, CoreError> {
    let uri = params
        .get("uri")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::validation("resources/read requires a 'uri'"))?;
    let (connector_id, resource_uri) = split_namespaced_name(uri)
        .ok_or_else(|| CoreError::validation(format!("'{uri}' is not a namespaced resource uri")))?;
    let outcome = proxy.read_resource(connector_id, resource_uri).await?;
    outcome.result
}
