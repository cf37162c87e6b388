use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum A2aError {
    #[error("disabled")]
    Disabled,

    #[error("no URL configured")]
    NoUrl,

    #[error("not found")]
    NotFound,

    #[error("ssrf check failed: {0}")]
    Ssrf(#[from] crate::ssrf::SsrfError),

    #[error("http error: {0}")]
    Http(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("upstream error {code}: {message}")]
    Upstream { code: i64, message: String },
}

pub type A2aResult<T> = Result<T, A2aError>;

impl From<A2aError> for conduit_core::CoreError {
    fn from(e: A2aError) -> Self {
        match e {
            A2aError::Disabled | A2aError::NoUrl | A2aError::NotFound => {
                conduit_core::CoreError::not_found(e.to_string())
            }
            A2aError::Ssrf(inner) => conduit_core::CoreError::validation(inner.to_string()),
            A2aError::Timeout(ms) => conduit_core::CoreError::timeout(ms),
            A2aError::Http(_) | A2aError::InvalidResponse(_) => {
                conduit_core::CoreError::transport_closed(e.to_string())
            }
            A2aError::Upstream { code, message } => conduit_core::CoreError::upstream(code, message),
        }
    }
}
