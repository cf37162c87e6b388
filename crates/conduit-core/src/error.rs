use thiserror::Error;

/// The error taxonomy shared across the control plane (spec §7).
///
/// Every component-specific error type converts into this one at its public boundary so
/// that the gateway and the CLI surface can map failures to a stable set of kinds without
/// knowing which crate raised them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("queue full")]
    QueueFull,

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("transport closed: {0}")]
    TransportClosed(String),

    #[error("upstream error {code}: {message}")]
    Upstream { code: i64, message: String },

    #[error("internal: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn timeout(ms: u64) -> Self {
        Self::Timeout(ms)
    }

    pub fn transport_closed(msg: impl Into<String>) -> Self {
        Self::TransportClosed(msg.into())
    }

    pub fn upstream(code: i64, message: impl Into<String>) -> Self {
        Self::Upstream {
            code,
            message: message.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable short name used as a wire/error-code tag (gateway JSON bodies, CLI output).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::QueueFull => "queue_full",
            Self::Timeout(_) => "timeout",
            Self::TransportClosed(_) => "transport_closed",
            Self::Upstream { .. } => "upstream_error",
            Self::Internal(_) | Self::Io(_) | Self::Json(_) => "internal",
        }
    }

    /// A message safe to hand back to an external caller — never echoes internal I/O or
    /// JSON parser detail.
    pub fn sanitize(&self) -> String {
        match self {
            Self::Validation(m) | Self::NotFound(m) | Self::Forbidden(m) => m.clone(),
            Self::QueueFull => "request queue is full".to_string(),
            Self::Timeout(ms) => format!("operation timed out after {ms}ms"),
            Self::TransportClosed(_) => "connection to upstream was closed".to_string(),
            Self::Upstream { code, message } => format!("upstream error {code}: {message}"),
            Self::Internal(_) | Self::Io(_) | Self::Json(_) => {
                "internal error".to_string()
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::QueueFull | Self::TransportClosed(_))
    }
}

/// Adds domain context to any error at a crate boundary, mirroring the teacher's
/// `ProxyErrorExt` pattern of attaching a short "where" tag without losing the source.
pub trait CoreErrorExt<T> {
    fn context_validation(self, ctx: &str) -> CoreResult<T>;
    fn context_internal(self, ctx: &str) -> CoreResult<T>;
}

impl<T, E> CoreErrorExt<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context_validation(self, ctx: &str) -> CoreResult<T> {
        self.map_err(|e| CoreError::validation(format!("{ctx}: {e}")))
    }

    fn context_internal(self, ctx: &str) -> CoreResult<T> {
        self.map_err(|e| CoreError::internal(format!("{ctx}: {e}")))
    }
}
