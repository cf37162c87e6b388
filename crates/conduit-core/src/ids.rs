use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing JSON-RPC request id, scoped to one transport connection.
///
/// The teacher's `StdioTransport` accepts ids the peer sends; this one additionally
/// *allocates* outbound ids for requests we issue, since conduit-transport is a
/// correlating client rather than a pass-through primitive.
#[derive(Debug, Default)]
pub struct RequestId(AtomicU64);

impl RequestId {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn new_event_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
