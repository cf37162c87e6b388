//! Error envelope and JSON-RPC-error-to-HTTP-status mapping (spec §4.10).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use conduit_core::CoreError;
use serde_json::json;

pub struct GatewayError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub request_id: String,
}

impl GatewayError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            request_id: request_id.into(),
        }
    }

    pub fn unauthorized(request_id: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "missing or invalid bearer token", request_id)
    }

    pub fn invalid_token(request_id: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "INVALID_TOKEN", "bearer token did not match any configured token", request_id)
    }

    pub fn forbidden(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message, request_id)
    }

    /// Maps a `CoreError` surfaced by the proxy/queue/a2a layers to an HTTP response
    /// (spec §4.10 error mapping table).
    pub fn from_core_error(err: &CoreError, request_id: impl Into<String>) -> Self {
        let request_id = request_id.into();
        match err {
            CoreError::QueueFull => Self::new(StatusCode::TOO_MANY_REQUESTS, "TOO_MANY_REQUESTS", err.sanitize(), request_id),
            CoreError::Timeout(_) => Self::new(StatusCode::GATEWAY_TIMEOUT, "GATEWAY_TIMEOUT", err.sanitize(), request_id),
            CoreError::Validation(_) => Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", err.sanitize(), request_id),
            CoreError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", err.sanitize(), request_id),
            CoreError::Forbidden(_) => Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", err.sanitize(), request_id),
            CoreError::Upstream { code, .. } => Self::from_jsonrpc_code(*code, err.sanitize(), request_id),
            _ => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", err.sanitize(), request_id),
        }
    }

    /// Maps a raw JSON-RPC error code returned by an upstream MCP connector.
    pub fn from_jsonrpc_code(code: i64, message: impl Into<String>, request_id: impl Into<String>) -> Self {
        let request_id = request_id.into();
        let message = message.into();
        match code {
            -32700 => Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message, request_id),
            -32603..=-32600 => Self::new(StatusCode::BAD_GATEWAY, "BAD_GATEWAY", message, request_id),
            _ => Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message, request_id),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {"code": self.code, "message": self.message, "request_id": self.request_id}
        });
        (self.status, axum::Json(body)).into_response()
    }
}
