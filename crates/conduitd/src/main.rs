//! `conduitd` (spec §6.1): loads configuration, opens the event and proofs stores,
//! populates the target registry, starts one admission queue per enabled connector, and
//! serves the aggregating proxy on stdio plus, optionally, the HTTP gateway — all in one
//! process, matching the teacher's single-binary `serve` command shape
//! (`turbomcp-proxy/src/cli/commands/serve.rs`).

mod config;
mod logging;
mod stdio_server;

use anyhow::{Context, Result};
use clap::Parser;
use conduit_core::{TargetProtocol, TargetType};
use conduit_gateway::auth::{AuthConfig, AuthMode, TokenEntry};
use conduit_gateway::{AppState, GatewayConfig};
use conduit_proxy::{AggregatingProxy, RuntimeState};
use conduit_queue::{QueueConfig, QueueManager};
use conduit_registry::Registry;
use conduit_retention::Retention;
use conduit_store::Store;
use logging::LogFormat;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "conduitd", version, about = "MCP/A2A observability and control-plane daemon")]
struct Cli {
    /// Path to the root TOML configuration document.
    #[arg(long, default_value = "conduit.toml")]
    config: PathBuf,

    /// Path to the event-log SQLite database. Defaults to a sibling of `--config`.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Also bind the HTTP gateway in this process.
    #[arg(long)]
    gateway: bool,

    /// Address the HTTP gateway binds to when `--gateway` is set.
    #[arg(long, default_value = "127.0.0.1:8089")]
    bind: String,

    #[arg(long, value_enum, default_value = "compact")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    let config_dir = cli
        .config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."))
        .to_path_buf();

    let root_config =
        config::RootConfig::load(&cli.config).with_context(|| format!("loading config '{}'", cli.config.display()))?;

    let db_path = cli.db.clone().unwrap_or_else(|| config_dir.join("events.db"));
    let proofs_db_path = config_dir.join("proofs.db");

    let store = Store::open(&db_path).await.with_context(|| format!("opening event store '{}'", db_path.display()))?;
    // Opened here only to run its migration on startup; conduit-retention is deliberately
    // never given this handle (spec §3.1, "never pruned").
    let _proofs = conduit_store::ProofsStore::open(&proofs_db_path)
        .await
        .with_context(|| format!("opening proofs store '{}'", proofs_db_path.display()))?;

    let registry = Registry::new(store.clone());
    import_connectors(&registry, &root_config).await?;

    let queues = Arc::new(QueueManager::new(QueueConfig::default()));
    let proxy = Arc::new(AggregatingProxy::new(store.clone(), config_dir.clone(), Arc::clone(&queues)));

    let runtime_state_path = config_dir.join("runtime_state.json");
    let started_at = conduit_core::now_rfc3339();
    RuntimeState::new(started_at.clone()).write_atomic(&runtime_state_path).context("writing initial runtime state")?;

    let retention = Arc::new(Retention::new(store.clone(), registry.clone(), root_config.retention.unwrap_or_default()));
    let retention_handle = tokio::spawn(retention_loop(Arc::clone(&retention)));

    let heartbeat_handle = tokio::spawn(heartbeat_loop(runtime_state_path.clone(), started_at.clone()));

    let stdio_handle = tokio::spawn(stdio_server::serve(Arc::clone(&proxy)));

    let gateway_handle = if cli.gateway {
        Some(spawn_gateway(&cli.bind, &root_config, registry.clone(), Arc::clone(&proxy), store.clone()).await?)
    } else {
        None
    };

    tokio::select! {
        result = stdio_handle => {
            result.context("stdio server task panicked")?.context("stdio server loop failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }

    retention_handle.abort();
    heartbeat_handle.abort();
    if let Some(handle) = gateway_handle {
        handle.abort();
    }
    RuntimeState::new(conduit_core::now_rfc3339())
        .stopped()
        .write_atomic(&runtime_state_path)
        .context("writing final runtime state")?;

    Ok(())
}

/// Populates the registry from `connectors[]`. Idempotent across restarts: an existing
/// target is left in place (only its enabled flag is reconciled) rather than erroring.
async fn import_connectors(registry: &Registry, root_config: &config::RootConfig) -> Result<()> {
    for entry in &root_config.connectors {
        let transport_json = match &entry.transport {
            config::TransportEntry::Stdio { command, args, env, cwd } => {
                json!({"command": command, "args": args, "env": env, "cwd": cwd})
            }
            config::TransportEntry::RpcHttp { .. } | config::TransportEntry::RpcSse { .. } => {
                anyhow::bail!("connector '{}': only stdio transport is implemented", entry.id);
            }
        };

        match registry
            .create(&entry.id, TargetType::Connector, TargetProtocol::Mcp, None, transport_json)
            .await
        {
            Ok(()) => {}
            Err(_) => {
                // Already imported on a prior run; just reconcile the enabled flag.
                registry
                    .set_enabled(&entry.id, entry.enabled)
                    .await
                    .with_context(|| format!("reconciling connector '{}'", entry.id))?;
                continue;
            }
        }
        if !entry.enabled {
            registry.set_enabled(&entry.id, false).await?;
        }
    }
    Ok(())
}

async fn retention_loop(retention: Arc<Retention>) {
    let mut interval = tokio::time::interval(Duration::from_secs(3600));
    loop {
        interval.tick().await;
        match retention.apply().await {
            Ok(report) => tracing::info!(?report, "retention pass complete"),
            Err(e) => tracing::warn!(error = %e, "retention pass failed"),
        }
    }
}

/// Refreshes the runtime-state file's heartbeat every 5s so a consumer polling
/// `runtime_state.json` can declare the process dead once the field goes 30s stale
/// (spec §4.8). Keeps `started_at` fixed across ticks; only `heartbeat` moves.
async fn heartbeat_loop(runtime_state_path: PathBuf, started_at: String) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;
        if let Err(e) = RuntimeState::new(started_at.clone()).write_atomic(&runtime_state_path) {
            tracing::warn!(error = %e, "failed to refresh runtime state heartbeat");
        }
    }
}

async fn spawn_gateway(
    bind: &str,
    root_config: &config::RootConfig,
    registry: Registry,
    proxy: Arc<AggregatingProxy>,
    store: Store,
) -> Result<tokio::task::JoinHandle<()>> {
    let gateway_doc = root_config.gateway.clone();
    let hide_not_found = gateway_doc.as_ref().map(|g| g.hide_not_found).unwrap_or(false);
    let tokens: Vec<TokenEntry> = gateway_doc
        .as_ref()
        .map(|g| {
            g.tokens
                .iter()
                .map(|t| TokenEntry { hash: t.hash.clone(), permissions: t.permissions.clone() })
                .collect()
        })
        .unwrap_or_default();
    let mode = if tokens.is_empty() { AuthMode::None } else { AuthMode::Bearer };

    let agent_cache = Arc::new(conduit_a2a::AgentCardCache::new(store.clone(), conduit_a2a::CacheConfig::default()));

    let state = AppState {
        registry,
        proxy,
        agent_cache,
        store,
        auth: Arc::new(AuthConfig { mode, tokens }),
        config: GatewayConfig { hide_not_found },
    };

    let app = conduit_gateway::router(state);
    let listener = tokio::net::TcpListener::bind(bind).await.with_context(|| format!("binding gateway to '{bind}'"))?;
    tracing::info!(%bind, "gateway listening");
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "gateway server exited");
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_no_gateway() {
        let cli = Cli::try_parse_from(["conduitd"]).unwrap();
        assert!(!cli.gateway);
        assert_eq!(cli.config, PathBuf::from("conduit.toml"));
        assert_eq!(cli.log_format, LogFormat::Compact);
    }

    #[test]
    fn cli_accepts_explicit_db_and_bind() {
        let cli = Cli::try_parse_from([
            "conduitd",
            "--config",
            "/etc/conduit/conduit.toml",
            "--db",
            "/var/lib/conduit/events.db",
            "--gateway",
            "--bind",
            "0.0.0.0:9000",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/var/lib/conduit/events.db")));
        assert!(cli.gateway);
        assert_eq!(cli.bind, "0.0.0.0:9000");
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[tokio::test]
    async fn import_connectors_is_idempotent_across_restarts() {
        let store = Store::open_in_memory().await.unwrap();
        let registry = Registry::new(store);
        let doc = r#"
            version = 1
            [[connectors]]
            id = "fs"
            [connectors.transport]
            type = "stdio"
            command = "mcp-server-fs"
        "#;
        let root_config: config::RootConfig = toml::from_str(doc).unwrap();

        import_connectors(&registry, &root_config).await.unwrap();
        import_connectors(&registry, &root_config).await.unwrap();

        let target = registry.get("fs").await.unwrap();
        assert!(target.enabled);
    }
}
