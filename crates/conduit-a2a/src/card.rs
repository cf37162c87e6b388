use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An agent's descriptor, fetched over HTTPS from a non-private URL (spec §3, Agent card).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    pub url: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub fn hash_card(card: &AgentCard) -> String {
    let bytes = serde_json::to_vec(card).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect::<String>()
}
