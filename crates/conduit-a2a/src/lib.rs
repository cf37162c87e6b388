//! A2A client, agent card cache, and SSRF protection (spec §4.6).

mod cache;
mod card;
mod client;
mod error;
pub mod ssrf;

pub use cache::{AgentCardCache, CacheConfig};
pub use card::AgentCard;
pub use client::A2aClient;
pub use error::{A2aError, A2aResult};
