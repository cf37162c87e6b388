//! HTTP front door (spec §4.10): bearer auth, wildcard permission checks, MCP/A2A proxy
//! endpoints, and an SSE audit stream.
//!
//! Grounded on `turbomcp-server`'s Axum wiring (`crates/turbomcp-server/src/server/core.rs`,
//! `run_websocket_with_config`): build a plain `axum::Router`, layer `tower-http::trace`,
//! bind with `tokio::net::TcpListener`, serve with `axum::serve`. The per-request
//! `tracing::info_span!` and `X-Queue-Wait-Ms`/`X-Upstream-Latency-Ms` timing headers are
//! this crate's own addition — the teacher's HTTP transport has no per-connector queue to
//! report timings for.

pub mod auth;
pub mod error;
pub mod permissions;
mod state;

pub use state::{AppState, GatewayConfig};

use auth::AuthConfig;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use error::GatewayError;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::{Duration, Instant};
use tower_http::trace::TraceLayer;
use tracing::info_span;
use uuid::Uuid;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/mcp", post(mcp_handler))
        .route("/a2a/v1/{*op}", post(a2a_handler))
        .route("/events/stream", get(events_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

fn request_id() -> String {
    Uuid::new_v4().to_string()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Auth → permission check, shared by `/mcp` and `/a2a/v1/*`. Returns the matched token's
/// permission list so the caller can check it against the built permission string.
fn authenticate(auth: &AuthConfig, headers: &HeaderMap, request_id: &str) -> Result<Vec<String>, GatewayError> {
    match auth.mode {
        auth::AuthMode::None => Ok(vec!["*".to_string()]),
        auth::AuthMode::Bearer => {
            let token = bearer_token(headers).ok_or_else(|| GatewayError::unauthorized(request_id))?;
            let entry = auth
                .authenticate(token)
                .ok_or_else(|| GatewayError::invalid_token(request_id))?;
            Ok(entry.permissions.clone())
        }
    }
}

fn check_permission(granted: &[String], required: &str, request_id: &str) -> Result<(), GatewayError> {
    if permissions::any_matches(granted, required) {
        Ok(())
    } else {
        Err(GatewayError::forbidden(request_id, format!("missing permission '{required}'")))
    }
}

fn timing_headers(queue_wait_ms: u64, upstream_latency_ms: u64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("x-queue-wait-ms"),
        queue_wait_ms.to_string().parse().unwrap(),
    );
    headers.insert(
        HeaderName::from_static("x-upstream-latency-ms"),
        upstream_latency_ms.to_string().parse().unwrap(),
    );
    headers
}

#[derive(Debug, Deserialize)]
struct McpRequest {
    connector: String,
    method: String,
    #[serde(default)]
    params: Value,
}

async fn mcp_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<McpRequest>,
) -> Response {
    let request_id = request_id();
    let span = info_span!("gateway.mcp", request_id = %request_id, method = %body.method, connector = %body.connector);
    let _enter = span.enter();

    let granted = match authenticate(&state.auth, &headers, &request_id) {
        Ok(g) => g,
        Err(e) => return e.into_response(),
    };
    let required = permissions::mcp_permission(&body.method, Some(&body.connector));
    if let Err(e) = check_permission(&granted, &required, &request_id) {
        return e.into_response();
    }

    match state.registry.get(&body.connector).await {
        Ok(target) if target.target_type != "connector" => {
            return resolve_not_found(&state, &request_id, "not a connector target").into_response();
        }
        Ok(target) if !target.enabled => {
            return resolve_not_found(&state, &request_id, "connector is disabled").into_response();
        }
        Err(_) => return resolve_not_found(&state, &request_id, "connector not found").into_response(),
        Ok(_) => {}
    }

    let params = conduit_proxy::strip_bridge_envelope(body.params);
    match state.proxy.call_connector_method(&body.connector, &body.method, params).await {
        Ok(outcome) => match outcome.result {
            Ok(value) => {
                let headers = timing_headers(outcome.queue_wait_ms, outcome.upstream_latency_ms);
                (StatusCode::OK, headers, Json(value)).into_response()
            }
            Err(e) => GatewayError::from_core_error(&e, request_id).into_response(),
        },
        Err(e) => GatewayError::from_core_error(&e, request_id).into_response(),
    }
}

fn resolve_not_found(state: &AppState, request_id: &str, message: &str) -> GatewayError {
    if state.config.hide_not_found {
        GatewayError::forbidden(request_id, "forbidden")
    } else {
        GatewayError::new(StatusCode::NOT_FOUND, "NOT_FOUND", message, request_id)
    }
}

#[derive(Debug, Deserialize)]
struct A2aRequest {
    agent: String,
    #[serde(default)]
    params: Value,
}

async fn a2a_handler(
    State(state): State<AppState>,
    Path(op): Path<String>,
    headers: HeaderMap,
    Json(body): Json<A2aRequest>,
) -> Response {
    let request_id = request_id();
    let span = info_span!("gateway.a2a", request_id = %request_id, op = %op, agent = %body.agent);
    let _enter = span.enter();

    let granted = match authenticate(&state.auth, &headers, &request_id) {
        Ok(g) => g,
        Err(e) => return e.into_response(),
    };
    let required = permissions::a2a_permission(&op, Some(&body.agent));
    if let Err(e) = check_permission(&granted, &required, &request_id) {
        return e.into_response();
    }

    let client = match state.agent_cache.create_client(&body.agent).await {
        Ok(c) => c,
        Err(_) => return resolve_not_found(&state, &request_id, "agent not found").into_response(),
    };

    let started = Instant::now();
    let result = match op.as_str() {
        "message/send" | "tasks/send" => {
            let message = body.params.get("message").cloned().unwrap_or(body.params.clone());
            let blocking = body
                .params
                .get("configuration")
                .and_then(|c| c.get("blocking"))
                .and_then(Value::as_bool)
                .unwrap_or(true);
            client.send_message(message, blocking).await
        }
        "tasks/get" => {
            let task_id = body.params.get("task_id").and_then(Value::as_str).unwrap_or_default();
            client.get_task(task_id).await
        }
        "tasks/cancel" => {
            let task_id = body.params.get("task_id").and_then(Value::as_str).unwrap_or_default();
            client.cancel_task(task_id).await
        }
        other => {
            return GatewayError::new(StatusCode::NOT_FOUND, "NOT_FOUND", format!("unknown a2a op '{other}'"), request_id)
                .into_response();
        }
    };
    let upstream_latency_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(value) => {
            let headers = timing_headers(0, upstream_latency_ms);
            (StatusCode::OK, headers, Json(value)).into_response()
        }
        Err(e) => {
            let core: conduit_core::CoreError = e.into();
            GatewayError::from_core_error(&core, request_id).into_response()
        }
    }
}

/// SSE audit stream: polls the event store every 500ms for rows newer than the last poll
/// and forwards each as a distinct `audit` event (spec §4.10).
async fn events_stream(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let store = state.store.clone();
    let start_ts = conduit_core::now_rfc3339();

    let batches = futures::stream::unfold((store, start_ts), |(store, last_ts)| async move {
        loop {
            tokio::time::sleep(Duration::from_millis(500)).await;
            match store.events_since(&last_ts, 200).await {
                Ok(events) if !events.is_empty() => {
                    let new_ts = events.last().map(|e| e.ts.clone()).unwrap_or(last_ts.clone());
                    return Some((events, (store, new_ts)));
                }
                Ok(_) => continue,
                Err(_) => continue,
            }
        }
    });

    let stream = batches.flat_map(|batch| {
        futures::stream::iter(batch.into_iter().map(|event| {
            Ok(SseEvent::default()
                .event("audit")
                .data(serde_json::to_string(&event).unwrap_or_default()))
        }))
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth::{hash_token, AuthMode, TokenEntry};
    use conduit_a2a::CacheConfig;
    use conduit_proxy::AggregatingProxy;
    use conduit_queue::QueueManager;
    use conduit_registry::Registry;
    use conduit_store::Store;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn test_state(hide_not_found: bool) -> AppState {
        let store = Store::open_in_memory().await.unwrap();
        let registry = Registry::new(store.clone());
        let queues = Arc::new(QueueManager::new(Default::default()));
        let dir = tempfile::tempdir().unwrap();
        let proxy = Arc::new(AggregatingProxy::new(store.clone(), dir.path(), queues));
        let agent_cache = Arc::new(conduit_a2a::AgentCardCache::new(store.clone(), CacheConfig::default()));
        AppState {
            registry,
            proxy,
            agent_cache,
            store,
            auth: Arc::new(AuthConfig::default()),
            config: GatewayConfig { hide_not_found },
        }
    }

    #[tokio::test]
    async fn health_is_reachable_without_auth() {
        let state = test_state(false).await;
        let app = router(state);
        let response = app
            .oneshot(axum::http::Request::builder().uri("/health").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn mcp_requires_bearer_token_in_bearer_mode() {
        let mut state = test_state(false).await;
        state.auth = Arc::new(AuthConfig {
            mode: AuthMode::Bearer,
            tokens: vec![TokenEntry { hash: hash_token("tok"), permissions: vec!["mcp:*".into()] }],
        });
        let app = router(state);
        let body = json!({"connector": "fs", "method": "tools/list", "params": {}}).to_string();
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn mcp_unknown_connector_is_not_found_by_default() {
        let state = test_state(false).await;
        let app = router(state);
        let body = json!({"connector": "missing", "method": "tools/list", "params": {}}).to_string();
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn mcp_unknown_connector_is_forbidden_when_hiding_not_found() {
        let state = test_state(true).await;
        let app = router(state);
        let body = json!({"connector": "missing", "method": "tools/list", "params": {}}).to_string();
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
