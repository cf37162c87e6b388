use serde::{Deserialize, Serialize};

/// Which side observed a framed message (spec §3, Event.direction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientToServer => "client_to_server",
            Self::ServerToClient => "server_to_client",
        }
    }
}

/// Classification of a single JSON-RPC message (spec §3, Event.kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Request,
    Response,
    Notification,
    TransportEvent,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Notification => "notification",
            Self::TransportEvent => "transport_event",
        }
    }
}

/// Why a session ended (spec §3, Session.exit_reason).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Normal,
    Error,
    Killed,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Error => "error",
            Self::Killed => "killed",
        }
    }
}

/// Target.type (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Connector,
    Agent,
}

/// Target.protocol (spec §3). Must agree with `TargetType` per the invariant in §3/§4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetProtocol {
    Mcp,
    A2a,
}

impl TargetType {
    /// Returns `true` when `(type, protocol)` satisfies the spec's hard invariant.
    pub fn matches(self, protocol: TargetProtocol) -> bool {
        matches!(
            (self, protocol),
            (TargetType::Connector, TargetProtocol::Mcp) | (TargetType::Agent, TargetProtocol::A2a)
        )
    }
}

/// A2A task lifecycle status (spec §6, wire protocol — A2A upstream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Working,
    InputRequired,
    Completed,
    Failed,
    Canceled,
    Rejected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_protocol_invariant() {
        assert!(TargetType::Connector.matches(TargetProtocol::Mcp));
        assert!(TargetType::Agent.matches(TargetProtocol::A2a));
        assert!(!TargetType::Connector.matches(TargetProtocol::A2a));
        assert!(!TargetType::Agent.matches(TargetProtocol::Mcp));
    }
}
