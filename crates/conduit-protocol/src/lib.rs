//! Classifies JSON-RPC 2.0 messages, computes payload hashes, and produces short
//! human-readable summaries for the event log (spec §4.5).

use conduit_core::EventKind;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Classifies a parsed JSON-RPC message. Direction is *not* inferred here — it depends on
/// which stream the caller observed the message on, so callers pass it in separately.
pub fn classify(value: &Value) -> EventKind {
    let has_id = value.get("id").is_some();
    let has_method = value.get("method").is_some();
    let is_reply = value.get("result").is_some() || value.get("error").is_some();

    if is_reply && has_id {
        EventKind::Response
    } else if has_method && has_id {
        EventKind::Request
    } else if has_method {
        EventKind::Notification
    } else {
        EventKind::TransportEvent
    }
}

/// First 16 hex characters of SHA-256 over the raw serialized payload (spec §3,
/// Event.payload_hash).
pub fn payload_hash(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    let full = hex_encode(&digest);
    full[..16].to_string()
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Produces a one-line human summary of a message for display in `view`/`log` style
/// surfaces, matching the short-form summaries the spec requires be recorded alongside
/// each event.
pub fn summarize(value: &Value) -> String {
    if let Some(method) = value.get("method").and_then(Value::as_str) {
        match method {
            "tools/call" => {
                let name = value
                    .get("params")
                    .and_then(|p| p.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("?");
                format!("call {name}")
            }
            other => other.to_string(),
        }
    } else if let Some(error) = value.get("error") {
        let msg = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        format!("error: {msg}")
    } else if let Some(result) = value.get("result") {
        summarize_result(result)
    } else {
        "message".to_string()
    }
}

fn summarize_result(result: &Value) -> String {
    if let Some(tools) = result.get("tools").and_then(Value::as_array) {
        return format!("{} tools", tools.len());
    }
    if let Some(resources) = result.get("resources").and_then(Value::as_array) {
        return format!("{} resources", resources.len());
    }
    if let Some(prompts) = result.get("prompts").and_then(Value::as_array) {
        return format!("{} prompts", prompts.len());
    }
    "ok".to_string()
}

/// Verifies the invariant from spec §8: for any persisted event with both `raw_json` and
/// `payload_hash`, the hash must match.
pub fn verify_payload_hash(raw: &str, hash: &str) -> bool {
    payload_hash(raw) == hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_request_response_notification() {
        assert_eq!(
            classify(&json!({"jsonrpc":"2.0","id":1,"method":"tools/list"})),
            EventKind::Request
        );
        assert_eq!(
            classify(&json!({"jsonrpc":"2.0","id":1,"result":{}})),
            EventKind::Response
        );
        assert_eq!(
            classify(&json!({"jsonrpc":"2.0","method":"notifications/initialized"})),
            EventKind::Notification
        );
    }

    #[test]
    fn hash_matches_reference_length_and_verification() {
        let raw = r#"{"jsonrpc":"2.0","id":1}"#;
        let h = payload_hash(raw);
        assert_eq!(h.len(), 16);
        assert!(verify_payload_hash(raw, &h));
        assert!(!verify_payload_hash(raw, "0000000000000000"));
    }

    #[test]
    fn summarizes_tool_call_and_list_result() {
        let call = json!({"method":"tools/call","params":{"name":"grep"}});
        assert_eq!(summarize(&call), "call grep");
        let list = json!({"result":{"tools":[1,2,3]}});
        assert_eq!(summarize(&list), "3 tools");
    }
}
