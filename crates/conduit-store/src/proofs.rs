//! Proofs store (spec §3.1): a second, independently-versioned SQLite database holding
//! `plans` and `runs` rows for the `user_refs` kinds `plan`/`run`. Kept separate from the
//! events database the same way the teacher keeps audit/telemetry data out of its
//! operational store (`turbomcp-auth::audit`). **Never pruned** — `conduit-retention` has
//! no access to this type at all, which is how "MUST NOT touch" is enforced here.

use crate::error::{is_benign_rerun_error, StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{ConnectOptions, Executor, SqlitePool};
use std::path::Path;

pub const PROOFS_SCHEMA_VERSION: i64 = 2;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Plan {
    pub id: String,
    pub name: Option<String>,
    pub body_json: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Run {
    pub id: String,
    pub plan_id: String,
    pub status: String,
    pub started_at: String,
    pub finished_at: Option<String>,
}

#[derive(Clone)]
pub struct ProofsStore {
    pool: SqlitePool,
}

impl ProofsStore {
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .foreign_keys(true)
            .disable_statement_logging();
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn open_in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn create_plan(&self, id: &str, name: Option<&str>, body_json: &str) -> StoreResult<()> {
        sqlx::query("INSERT INTO plans (id, name, body_json, created_at) VALUES (?, ?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(body_json)
            .bind(conduit_core::now_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn get_plan(&self, id: &str) -> StoreResult<Plan> {
        sqlx::query_as("SELECT * FROM plans WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    pub async fn create_run(&self, id: &str, plan_id: &str) -> StoreResult<()> {
        sqlx::query("INSERT INTO runs (id, plan_id, status, started_at, finished_at) VALUES (?, ?, 'running', ?, NULL)")
            .bind(id)
            .bind(plan_id)
            .bind(conduit_core::now_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn finish_run(&self, id: &str, status: &str) -> StoreResult<()> {
        sqlx::query("UPDATE runs SET status = ?, finished_at = ? WHERE id = ?")
            .bind(status)
            .bind(conduit_core::now_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn get_run(&self, id: &str) -> StoreResult<Run> {
        sqlx::query_as("SELECT * FROM runs WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

async fn migrate(pool: &SqlitePool) -> StoreResult<()> {
    let _ = pool.execute("PRAGMA foreign_keys = ON;").await;
    run(pool, "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)").await?;
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
    if count == 0 {
        run(pool, "INSERT INTO schema_version (version) VALUES (0)").await?;
    }
    let mut current: i64 = sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

    while current < PROOFS_SCHEMA_VERSION {
        let next = current + 1;
        for sql in statements_for(next) {
            run(pool, sql).await?;
        }
        sqlx::query("UPDATE schema_version SET version = ?")
            .bind(next)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        current = next;
    }
    Ok(())
}

async fn run(pool: &SqlitePool, sql: &str) -> StoreResult<()> {
    match pool.execute(sql).await {
        Ok(_) => Ok(()),
        Err(e) if is_benign_rerun_error(&e.to_string()) => Ok(()),
        Err(e) => Err(StoreError::Database(e.to_string())),
    }
}

fn statements_for(version: i64) -> &'static [&'static str] {
    match version {
        1 => &["CREATE TABLE IF NOT EXISTS plans (
                id TEXT PRIMARY KEY,
                name TEXT,
                body_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"],
        2 => &["CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                plan_id TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT,
                FOREIGN KEY (plan_id) REFERENCES plans(id) ON DELETE CASCADE
            )"],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plan_and_run_lifecycle() {
        let store = ProofsStore::open_in_memory().await.unwrap();
        store.create_plan("plan-1", Some("deploy"), "{}").await.unwrap();
        store.create_run("run-1", "plan-1").await.unwrap();

        let run = store.get_run("run-1").await.unwrap();
        assert_eq!(run.status, "running");

        store.finish_run("run-1", "completed").await.unwrap();
        let run = store.get_run("run-1").await.unwrap();
        assert_eq!(run.status, "completed");
        assert!(run.finished_at.is_some());
    }
}
