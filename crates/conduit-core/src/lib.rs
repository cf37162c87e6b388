//! Shared types and error taxonomy used by every conduit crate.

mod error;
mod ids;
mod model;

pub use error::{CoreError, CoreErrorExt, CoreResult};
pub use ids::{new_event_id, new_session_id, RequestId};
pub use model::{Direction, EventKind, ExitReason, TargetProtocol, TargetType, TaskStatus};

/// Current UTC time as an RFC3339 string, the on-disk timestamp format for every table.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
