use crate::card::{hash_card, AgentCard};
use crate::client::A2aClient;
use crate::error::{A2aError, A2aResult};
use conduit_core::{TargetProtocol, TargetType};
use conduit_store::{AgentCacheEntry, Store};

/// TTL for a cached agent card; `0` means "never expires" (spec §4.6).
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_seconds: 3600 }
    }
}

/// Builds an `A2aClient` for a target, reusing a cached card when present and unexpired,
/// otherwise fetching a fresh one from the target's configured URL (spec §4.6).
pub struct AgentCardCache {
    store: Store,
    config: CacheConfig,
}

impl AgentCardCache {
    pub fn new(store: Store, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub async fn create_client(&self, target_id: &str) -> A2aResult<A2aClient> {
        let target = self
            .store
            .get_target(target_id)
            .await
            .map_err(|_| A2aError::NotFound)?;
        if target.target_type != "agent" || target.protocol != "a2a" {
            return Err(A2aError::NotFound);
        }
        if !target.enabled {
            return Err(A2aError::Disabled);
        }

        if let Some(entry) = self.store.get_agent_cache(target_id).await.ok().flatten() {
            if !is_expired(&entry) {
                let card: AgentCard = serde_json::from_str(&entry.card_json)
                    .map_err(|e| A2aError::InvalidResponse(e.to_string()))?;
                return A2aClient::new(card);
            }
        }

        let config: serde_json::Value =
            serde_json::from_str(&target.config).unwrap_or_default();
        let url = config
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or(A2aError::NoUrl)?;

        let card = AgentCard {
            name: target.name.clone().unwrap_or_else(|| target_id.to_string()),
            url: url.to_string(),
            version: config
                .get("version")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            description: config
                .get("description")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        };

        // Fetching a fresh card still goes through `A2aClient::new`, so the SSRF check
        // runs before anything is cached.
        let client = A2aClient::new(card.clone())?;

        let fetched_at = conduit_core::now_rfc3339();
        let expires_at = if self.config.ttl_seconds == 0 {
            None
        } else {
            Some(
                (chrono::Utc::now() + chrono::Duration::seconds(self.config.ttl_seconds as i64))
                    .to_rfc3339(),
            )
        };
        let entry = AgentCacheEntry {
            target_id: target_id.to_string(),
            card_json: serde_json::to_string(&card).unwrap_or_default(),
            hash: hash_card(&card),
            fetched_at,
            expires_at,
        };
        let _ = self.store.put_agent_cache(&entry).await;

        Ok(client)
    }
}

fn is_expired(entry: &AgentCacheEntry) -> bool {
    let Some(expires_at) = &entry.expires_at else {
        return false;
    };
    match chrono::DateTime::parse_from_rfc3339(expires_at) {
        Ok(dt) => dt < chrono::Utc::now(),
        Err(_) => false,
    }
}

/// Enforced at target-creation time by `conduit-registry`; kept here too so the cache
/// itself never silently accepts a mismatched target.
pub fn type_protocol_invariant_holds(t: TargetType, p: TargetProtocol) -> bool {
    t.matches(p)
}
