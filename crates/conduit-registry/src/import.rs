use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unrecognized import document shape")]
    UnrecognizedShape,

    #[error("duplicate connector id '{0}'")]
    DuplicateId(String),

    #[error("connector '{0}' is missing a command")]
    MissingCommand(String),
}

/// One connector entry parsed out of any recognized import shape, ready to be handed to
/// `Registry::create` (spec §4.3, §6).
#[derive(Debug, Clone, Deserialize)]
pub struct ImportedConnector {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(default)]
    id: Option<String>,
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
}

/// Accepts the three ad-hoc import shapes the spec recognizes:
/// - Claude-Desktop-style `{"mcpServers": {"id": {"command": ..., "args": [...]}}}`
/// - a single object `{"id": ..., "command": ..., ...}`
/// - an array of objects, each shaped like the single-object form
pub fn import_connectors(doc: &Value) -> Result<Vec<ImportedConnector>, ImportError> {
    if let Some(servers) = doc.get("mcpServers").and_then(Value::as_object) {
        let mut out = Vec::with_capacity(servers.len());
        let mut seen = std::collections::HashSet::new();
        for (id, entry) in servers {
            if !seen.insert(id.clone()) {
                return Err(ImportError::DuplicateId(id.clone()));
            }
            let raw: RawEntry = serde_json::from_value(entry.clone())
                .map_err(|_| ImportError::UnrecognizedShape)?;
            out.push(finalize(id.clone(), raw)?);
        }
        return Ok(out);
    }

    if let Some(array) = doc.as_array() {
        let mut out = Vec::with_capacity(array.len());
        let mut seen = std::collections::HashSet::new();
        for entry in array {
            let raw: RawEntry =
                serde_json::from_value(entry.clone()).map_err(|_| ImportError::UnrecognizedShape)?;
            let id = raw.id.clone().ok_or(ImportError::UnrecognizedShape)?;
            if !seen.insert(id.clone()) {
                return Err(ImportError::DuplicateId(id.clone()));
            }
            out.push(finalize(id, raw)?);
        }
        return Ok(out);
    }

    if doc.is_object() {
        let raw: RawEntry =
            serde_json::from_value(doc.clone()).map_err(|_| ImportError::UnrecognizedShape)?;
        let id = raw.id.clone().ok_or(ImportError::UnrecognizedShape)?;
        return Ok(vec![finalize(id, raw)?]);
    }

    Err(ImportError::UnrecognizedShape)
}

fn finalize(id: String, raw: RawEntry) -> Result<ImportedConnector, ImportError> {
    let command = raw.command.ok_or_else(|| ImportError::MissingCommand(id.clone()))?;
    Ok(ImportedConnector {
        id,
        command,
        args: raw.args,
        env: raw.env,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn imports_claude_desktop_shape() {
        let doc = json!({
            "mcpServers": {
                "fs": {"command": "npx", "args": ["mcp-fs"]}
            }
        });
        let imported = import_connectors(&doc).unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].id, "fs");
    }

    #[test]
    fn imports_single_object_and_array() {
        let single = json!({"id": "a", "command": "cmd"});
        assert_eq!(import_connectors(&single).unwrap().len(), 1);

        let array = json!([{"id": "a", "command": "cmd"}, {"id": "b", "command": "cmd2"}]);
        assert_eq!(import_connectors(&array).unwrap().len(), 2);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let array = json!([{"id": "a", "command": "cmd"}, {"id": "a", "command": "cmd2"}]);
        assert!(matches!(
            import_connectors(&array),
            Err(ImportError::DuplicateId(_))
        ));
    }
}
