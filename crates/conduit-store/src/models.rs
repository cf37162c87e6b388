use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Target {
    pub id: String,
    #[sqlx(rename = "type")]
    pub target_type: String,
    pub protocol: String,
    pub name: Option<String>,
    pub enabled: bool,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub config: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub session_id: String,
    pub target_id: Option<String>,
    pub connector_id: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub exit_reason: Option<String>,
    pub protected: bool,
    pub actor_id: Option<String>,
    pub actor_kind: Option<String>,
    pub actor_label: Option<String>,
    pub secret_ref_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RpcCall {
    pub rpc_id: String,
    pub session_id: String,
    pub method: String,
    pub request_ts: String,
    pub response_ts: Option<String>,
    pub success: Option<bool>,
    pub error_code: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub event_id: String,
    pub session_id: String,
    pub rpc_id: Option<String>,
    pub direction: String,
    pub kind: String,
    pub ts: String,
    pub seq: Option<i64>,
    pub summary: Option<String>,
    pub payload_hash: Option<String>,
    pub raw_json: Option<String>,
    pub normalized_json: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TaskEvent {
    pub id: i64,
    pub session_id: String,
    pub task_id: String,
    pub event_kind: String,
    pub ts: String,
    pub detail_json: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRef {
    pub name: String,
    pub kind: String,
    pub connector: Option<String>,
    pub session: Option<String>,
    pub rpc: Option<String>,
    pub proto: Option<String>,
    pub level: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AgentCacheEntry {
    pub target_id: String,
    pub card_json: String,
    pub hash: String,
    pub fetched_at: String,
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Actor {
    pub actor_id: String,
    pub kind: String,
    pub label: Option<String>,
    pub created_at: String,
}
