//! Schema-versioned SQLite event store (spec §4.2): sessions, RPC calls, events, targets,
//! agent cache, user refs, and task events, plus the retention queries consumed by
//! `conduit-retention`.
//!
//! Grounded on `r2e-data-sqlx`'s pool-wrapper + `SqlxErrorExt` idiom, with hand-written
//! versioned migrations (see `migrations.rs`) instead of `sqlx::migrate!()`.

mod error;
pub mod migrations;
mod models;
pub mod proofs;

pub use error::{SqlxErrorExt, StoreError, StoreResult};
pub use models::{AgentCacheEntry, Event, RpcCall, Session, Target, TaskEvent, UserRef};
pub use proofs::{Plan, ProofsStore, Run};

use dashmap::DashMap;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{ConnectOptions, Row, SqlitePool};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Owns the single `SqlitePool` for one config directory. Constructed once by the daemon
/// and shared via `Arc`, per the single-mutable-owner guidance in spec §5.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    seq_counters: Arc<DashMap<String, AtomicI64>>,
}

impl Store {
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .foreign_keys(true)
            .disable_statement_logging();
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        migrations::migrate(&pool).await?;
        Ok(Self {
            pool,
            seq_counters: Arc::default(),
        })
    }

    pub async fn open_in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true)
            .disable_statement_logging();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        migrations::migrate(&pool).await?;
        Ok(Self {
            pool,
            seq_counters: Arc::default(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- sessions ----------------------------------------------------------------

    pub async fn create_session(
        &self,
        connector_id: &str,
        target_id: Option<&str>,
        actor: Option<(&str, &str, Option<&str>)>,
    ) -> StoreResult<String> {
        let session_id = conduit_core::new_session_id();
        let started_at = conduit_core::now_rfc3339();
        let (actor_id, actor_kind, actor_label) = actor
            .map(|(i, k, l)| (Some(i), Some(k), l))
            .unwrap_or((None, None, None));
        sqlx::query(
            "INSERT INTO sessions
                (session_id, connector_id, target_id, started_at, protected,
                 actor_id, actor_kind, actor_label, secret_ref_count)
             VALUES (?, ?, ?, ?, 0, ?, ?, ?, 0)",
        )
        .bind(&session_id)
        .bind(connector_id)
        .bind(target_id)
        .bind(&started_at)
        .bind(actor_id)
        .bind(actor_kind)
        .bind(actor_label)
        .execute(&self.pool)
        .await
        .into_store_error()?;
        Ok(session_id)
    }

    pub async fn end_session(&self, session_id: &str, exit_reason: &str) -> StoreResult<()> {
        let ended_at = conduit_core::now_rfc3339();
        sqlx::query("UPDATE sessions SET ended_at = ?, exit_reason = ? WHERE session_id = ?")
            .bind(&ended_at)
            .bind(exit_reason)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .into_store_error()?;
        Ok(())
    }

    pub async fn protect_session(&self, session_id: &str) -> StoreResult<()> {
        sqlx::query("UPDATE sessions SET protected = 1 WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .into_store_error()?;
        Ok(())
    }

    pub async fn increment_secret_ref_count(&self, session_id: &str) -> StoreResult<()> {
        sqlx::query(
            "UPDATE sessions SET secret_ref_count = secret_ref_count + 1 WHERE session_id = ?",
        )
        .bind(session_id)
        .execute(&self.pool)
        .await
        .into_store_error()?;
        Ok(())
    }

    pub async fn get_session(&self, session_id: &str) -> StoreResult<Session> {
        sqlx::query_as("SELECT * FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .into_store_error()
    }

    pub async fn delete_sessions(&self, session_ids: &[String]) -> StoreResult<u64> {
        let mut tx = self.pool.begin().await.into_store_error()?;
        let mut deleted = 0u64;
        for id in session_ids {
            let result = sqlx::query("DELETE FROM sessions WHERE session_id = ? AND protected = 0")
                .bind(id)
                .execute(&mut *tx)
                .await
                .into_store_error()?;
            deleted += result.rows_affected();
        }
        tx.commit().await.into_store_error()?;
        Ok(deleted)
    }

    // ---- rpc calls -----------------------------------------------------------------

    pub async fn save_rpc(&self, session_id: &str, rpc_id: &str, method: &str) -> StoreResult<()> {
        let request_ts = conduit_core::now_rfc3339();
        sqlx::query(
            "INSERT INTO rpc_calls (rpc_id, session_id, method, request_ts)
             VALUES (?, ?, ?, ?)",
        )
        .bind(rpc_id)
        .bind(session_id)
        .bind(method)
        .bind(&request_ts)
        .execute(&self.pool)
        .await
        .into_store_error()?;
        Ok(())
    }

    pub async fn complete_rpc(
        &self,
        session_id: &str,
        rpc_id: &str,
        success: bool,
        error_code: Option<i64>,
    ) -> StoreResult<()> {
        let response_ts = conduit_core::now_rfc3339();
        sqlx::query(
            "UPDATE rpc_calls SET response_ts = ?, success = ?, error_code = ?
             WHERE rpc_id = ? AND session_id = ?",
        )
        .bind(&response_ts)
        .bind(success)
        .bind(error_code)
        .bind(rpc_id)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .into_store_error()?;
        Ok(())
    }

    pub async fn latest_rpc(&self, session_id: &str) -> StoreResult<Option<RpcCall>> {
        sqlx::query_as(
            "SELECT * FROM rpc_calls WHERE session_id = ? ORDER BY request_ts DESC LIMIT 1",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .into_store_error()
    }

    pub async fn get_rpc(&self, session_id: &str, rpc_id: &str) -> StoreResult<RpcCall> {
        sqlx::query_as("SELECT * FROM rpc_calls WHERE session_id = ? AND rpc_id = ?")
            .bind(session_id)
            .bind(rpc_id)
            .fetch_one(&self.pool)
            .await
            .into_store_error()
    }

    // ---- events ----------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn save_event(
        &self,
        session_id: &str,
        rpc_id: Option<&str>,
        direction: &str,
        kind: &str,
        summary: Option<&str>,
        payload_hash: Option<&str>,
        raw_json: Option<&str>,
        normalized_json: Option<&str>,
    ) -> StoreResult<String> {
        let event_id = conduit_core::new_event_id();
        let ts = conduit_core::now_rfc3339();
        let seq = self
            .seq_counters
            .entry(session_id.to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(1, Ordering::SeqCst);
        sqlx::query(
            "INSERT INTO events
                (event_id, session_id, rpc_id, direction, kind, ts, seq,
                 summary, payload_hash, raw_json, normalized_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event_id)
        .bind(session_id)
        .bind(rpc_id)
        .bind(direction)
        .bind(kind)
        .bind(&ts)
        .bind(seq)
        .bind(summary)
        .bind(payload_hash)
        .bind(raw_json)
        .bind(normalized_json)
        .execute(&self.pool)
        .await
        .into_store_error()?;
        Ok(event_id)
    }

    pub async fn recent_events(&self, session_id: &str, limit: i64) -> StoreResult<Vec<Event>> {
        sqlx::query_as("SELECT * FROM events WHERE session_id = ? ORDER BY seq DESC LIMIT ?")
            .bind(session_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .into_store_error()
    }

    /// Global tail of the event timeline across every session, ordered oldest-first, used
    /// by the gateway's SSE audit stream to poll for newly-recorded events.
    pub async fn events_since(&self, after_ts: &str, limit: i64) -> StoreResult<Vec<Event>> {
        sqlx::query_as("SELECT * FROM events WHERE ts > ? ORDER BY ts ASC LIMIT ?")
            .bind(after_ts)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .into_store_error()
    }

    pub async fn latest_session_for_connector(&self, connector_id: &str) -> StoreResult<Session> {
        sqlx::query_as(
            "SELECT * FROM sessions WHERE connector_id = ? ORDER BY started_at DESC LIMIT 1",
        )
        .bind(connector_id)
        .fetch_one(&self.pool)
        .await
        .into_store_error()
    }

    pub async fn latest_session(&self) -> StoreResult<Session> {
        sqlx::query_as("SELECT * FROM sessions ORDER BY started_at DESC LIMIT 1")
            .fetch_one(&self.pool)
            .await
            .into_store_error()
    }

    pub async fn sessions_by_prefix(&self, prefix: &str) -> StoreResult<Vec<Session>> {
        let escaped = escape_like(prefix);
        sqlx::query_as(
            "SELECT * FROM sessions WHERE session_id LIKE ? ESCAPE '\\' ORDER BY started_at DESC",
        )
        .bind(format!("{escaped}%"))
        .fetch_all(&self.pool)
        .await
        .into_store_error()
    }

    // ---- targets ----------------------------------------------------------------

    pub async fn upsert_target(&self, target: &Target) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO targets (id, type, protocol, name, enabled, created_at, updated_at, config)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                type=excluded.type, protocol=excluded.protocol, name=excluded.name,
                enabled=excluded.enabled, updated_at=excluded.updated_at, config=excluded.config",
        )
        .bind(&target.id)
        .bind(&target.target_type)
        .bind(&target.protocol)
        .bind(&target.name)
        .bind(target.enabled)
        .bind(&target.created_at)
        .bind(&target.updated_at)
        .bind(&target.config)
        .execute(&self.pool)
        .await
        .into_store_error()?;
        Ok(())
    }

    pub async fn get_target(&self, id: &str) -> StoreResult<Target> {
        sqlx::query_as("SELECT * FROM targets WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .into_store_error()
    }

    pub async fn find_target_by_prefix(&self, prefix: &str) -> StoreResult<Target> {
        let escaped = escape_like(prefix);
        sqlx::query_as("SELECT * FROM targets WHERE id LIKE ? ESCAPE '\\' ORDER BY id LIMIT 1")
            .bind(format!("{escaped}%"))
            .fetch_one(&self.pool)
            .await
            .into_store_error()
    }

    pub async fn list_targets(
        &self,
        target_type: Option<&str>,
        enabled_only: bool,
    ) -> StoreResult<Vec<Target>> {
        let rows = sqlx::query(
            "SELECT * FROM targets
             WHERE (?1 IS NULL OR type = ?1) AND (?2 = 0 OR enabled = 1)
             ORDER BY created_at DESC",
        )
        .bind(target_type)
        .bind(enabled_only as i64)
        .fetch_all(&self.pool)
        .await
        .into_store_error()?;
        rows.into_iter()
            .map(|r| {
                Ok(Target {
                    id: r.try_get("id").into_store_error()?,
                    target_type: r.try_get("type").into_store_error()?,
                    protocol: r.try_get("protocol").into_store_error()?,
                    name: r.try_get("name").into_store_error()?,
                    enabled: r.try_get("enabled").into_store_error()?,
                    created_at: r.try_get("created_at").into_store_error()?,
                    updated_at: r.try_get("updated_at").into_store_error()?,
                    config: r.try_get("config").into_store_error()?,
                })
            })
            .collect()
    }

    pub async fn delete_target(&self, id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM targets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .into_store_error()?;
        Ok(())
    }

    // ---- agent cache ----------------------------------------------------------------

    pub async fn get_agent_cache(&self, target_id: &str) -> StoreResult<Option<AgentCacheEntry>> {
        sqlx::query_as("SELECT * FROM agent_cache WHERE target_id = ?")
            .bind(target_id)
            .fetch_optional(&self.pool)
            .await
            .into_store_error()
    }

    pub async fn put_agent_cache(&self, entry: &AgentCacheEntry) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO agent_cache (target_id, card_json, hash, fetched_at, expires_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(target_id) DO UPDATE SET
                card_json=excluded.card_json, hash=excluded.hash,
                fetched_at=excluded.fetched_at, expires_at=excluded.expires_at",
        )
        .bind(&entry.target_id)
        .bind(&entry.card_json)
        .bind(&entry.hash)
        .bind(&entry.fetched_at)
        .bind(&entry.expires_at)
        .execute(&self.pool)
        .await
        .into_store_error()?;
        Ok(())
    }

    // ---- user refs ----------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn put_user_ref(
        &self,
        name: &str,
        kind: &str,
        connector: Option<&str>,
        session: Option<&str>,
        rpc: Option<&str>,
        proto: Option<&str>,
        level: Option<&str>,
    ) -> StoreResult<()> {
        let created_at = conduit_core::now_rfc3339();
        sqlx::query(
            "INSERT INTO user_refs (name, kind, connector, session, rpc, proto, level, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                kind=excluded.kind, connector=excluded.connector, session=excluded.session,
                rpc=excluded.rpc, proto=excluded.proto, level=excluded.level",
        )
        .bind(name)
        .bind(kind)
        .bind(connector)
        .bind(session)
        .bind(rpc)
        .bind(proto)
        .bind(level)
        .bind(&created_at)
        .execute(&self.pool)
        .await
        .into_store_error()?;
        Ok(())
    }

    pub async fn get_user_ref(&self, name: &str) -> StoreResult<UserRef> {
        sqlx::query_as("SELECT * FROM user_refs WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .into_store_error()
    }

    // ---- task events ----------------------------------------------------------------

    pub async fn save_task_event(
        &self,
        session_id: &str,
        task_id: &str,
        event_kind: &str,
        detail_json: Option<&str>,
    ) -> StoreResult<()> {
        let ts = conduit_core::now_rfc3339();
        sqlx::query(
            "INSERT INTO task_events (session_id, task_id, event_kind, ts, detail_json)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(task_id)
        .bind(event_kind)
        .bind(&ts)
        .bind(detail_json)
        .execute(&self.pool)
        .await
        .into_store_error()?;
        Ok(())
    }

    // ---- retention ----------------------------------------------------------------

    /// Unprotected sessions for `connector_id` beyond the `keep_last` most recent.
    pub async fn prune_candidates_keep_last(
        &self,
        connector_id: &str,
        keep_last: i64,
    ) -> StoreResult<Vec<String>> {
        sqlx::query_scalar(
            "SELECT session_id FROM sessions
             WHERE connector_id = ? AND protected = 0
             ORDER BY started_at DESC
             LIMIT -1 OFFSET ?",
        )
        .bind(connector_id)
        .bind(keep_last)
        .fetch_all(&self.pool)
        .await
        .into_store_error()
    }

    pub async fn prune_candidates_before(&self, before_rfc3339: &str) -> StoreResult<Vec<String>> {
        sqlx::query_scalar(
            "SELECT session_id FROM sessions WHERE protected = 0 AND started_at < ?",
        )
        .bind(before_rfc3339)
        .fetch_all(&self.pool)
        .await
        .into_store_error()
    }

    pub async fn clear_raw_json_before(&self, before_rfc3339: &str) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE events SET raw_json = NULL
             WHERE raw_json IS NOT NULL AND ts < ?
             AND session_id IN (SELECT session_id FROM sessions WHERE protected = 0)",
        )
        .bind(before_rfc3339)
        .execute(&self.pool)
        .await
        .into_store_error()?;
        Ok(result.rows_affected())
    }

    pub async fn database_size_bytes(&self) -> StoreResult<i64> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await
            .into_store_error()?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await
            .into_store_error()?;
        Ok(page_count * page_size)
    }

    pub async fn vacuum(&self) -> StoreResult<()> {
        sqlx::query("VACUUM").execute(&self.pool).await.into_store_error()?;
        Ok(())
    }
}

fn escape_like(input: &str) -> String {
    input.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_lifecycle_and_events() {
        let store = Store::open_in_memory().await.unwrap();
        let session = store.create_session("c1", None, None).await.unwrap();
        store.save_rpc(&session, "1", "tools/list").await.unwrap();
        let raw = r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#;
        let hash = conduit_protocol_hash(raw);
        store
            .save_event(
                &session,
                Some("1"),
                "server_to_client",
                "response",
                Some("0 tools"),
                Some(&hash),
                Some(raw),
                None,
            )
            .await
            .unwrap();
        store.complete_rpc(&session, "1", true, None).await.unwrap();

        let events = store.recent_events(&session, 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].seq, Some(0));

        let rpc = store.get_rpc(&session, "1").await.unwrap();
        assert_eq!(rpc.success, Some(true));

        store.end_session(&session, "normal").await.unwrap();
        let fetched = store.get_session(&session).await.unwrap();
        assert_eq!(fetched.exit_reason.as_deref(), Some("normal"));
    }

    #[tokio::test]
    async fn protected_sessions_are_not_deleted() {
        let store = Store::open_in_memory().await.unwrap();
        let session = store.create_session("c1", None, None).await.unwrap();
        store.protect_session(&session).await.unwrap();
        let deleted = store.delete_sessions(&[session.clone()]).await.unwrap();
        assert_eq!(deleted, 0);
        assert!(store.get_session(&session).await.is_ok());
    }

    #[tokio::test]
    async fn cascading_delete_removes_events() {
        let store = Store::open_in_memory().await.unwrap();
        let session = store.create_session("c1", None, None).await.unwrap();
        store
            .save_event(&session, None, "client_to_server", "request", None, None, None, None)
            .await
            .unwrap();
        store.delete_sessions(&[session.clone()]).await.unwrap();
        let events = store.recent_events(&session, 10).await.unwrap();
        assert!(events.is_empty());
    }

    fn conduit_protocol_hash(raw: &str) -> String {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(raw.as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect::<String>()[..16].to_string()
    }
}
