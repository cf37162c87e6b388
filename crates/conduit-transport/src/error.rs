use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    #[error("failed to spawn child process: {0}")]
    Spawn(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("invalid json: {0}")]
    InvalidJson(String),

    #[error("line exceeds the 16MiB bound")]
    LineTooLong,

    #[error("serialized message contains an embedded newline")]
    EmbeddedNewline,

    #[error("transport closed")]
    Closed,

    #[error("timed out after {0}ms")]
    Timeout(u64),
}

pub type TransportResult<T> = Result<T, TransportError>;

impl From<TransportError> for conduit_core::CoreError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout(ms) => conduit_core::CoreError::timeout(ms),
            TransportError::Closed => conduit_core::CoreError::transport_closed("closed"),
            other => conduit_core::CoreError::transport_closed(other.to_string()),
        }
    }
}
