//! Atomic write-temp-then-rename runtime state file (spec §4.8).

use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct ConnectorSummary {
    pub id: String,
    pub enabled: bool,
    pub tool_count: Option<usize>,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClientStats {
    pub name: String,
    pub protocol_version: String,
    pub session_count: u64,
}

#[derive(Debug, Serialize)]
pub struct RuntimeState {
    pub schema_version: u32,
    pub state: &'static str,
    pub started_at: String,
    pub pid: u32,
    pub heartbeat: String,
    pub connectors: Vec<ConnectorSummary>,
    pub clients: HashMap<String, ClientStats>,
    pub log_buffer_size: usize,
}

impl RuntimeState {
    pub fn new(started_at: String) -> Self {
        Self {
            schema_version: 1,
            state: "RUNNING",
            started_at,
            pid: std::process::id(),
            heartbeat: conduit_core::now_rfc3339(),
            connectors: Vec::new(),
            clients: HashMap::new(),
            log_buffer_size: 0,
        }
    }

    pub fn stopped(mut self) -> Self {
        self.state = "STOPPED";
        self.heartbeat = conduit_core::now_rfc3339();
        self
    }

    /// Writes to a sibling temp file and renames over the target, so a reader never
    /// observes a partially-written file.
    pub fn write_atomic(&self, path: &Path) -> io::Result<()> {
        let body = serde_json::to_vec_pretty(self)?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &body)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}
