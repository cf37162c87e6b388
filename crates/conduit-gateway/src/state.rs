use crate::auth::AuthConfig;
use conduit_a2a::AgentCardCache;
use conduit_proxy::AggregatingProxy;
use conduit_registry::Registry;
use conduit_store::Store;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default)]
pub struct GatewayConfig {
    /// Unknown/disabled targets return 403 instead of 404, indistinguishable from a
    /// permission denial (spec §4.10, "hide-not-found").
    pub hide_not_found: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub proxy: Arc<AggregatingProxy>,
    pub agent_cache: Arc<AgentCardCache>,
    pub store: Store,
    pub auth: Arc<AuthConfig>,
    pub config: GatewayConfig,
}
