use thiserror::Error;

/// Bridges `sqlx::Error` into the store's domain error. Grounded on `r2e-data-sqlx`'s
/// `SqlxErrorExt` idiom: orphan rules forbid `impl From<sqlx::Error> for conduit_core::
/// CoreError` from a downstream crate owning neither type, so the conversion lives here as
/// an explicit extension trait instead.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("migration failed at version {version}: {message}")]
    Migration { version: i64, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation: {0}")]
    Validation(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait SqlxErrorExt<T> {
    fn into_store_error(self) -> StoreResult<T>;
}

impl<T> SqlxErrorExt<T> for Result<T, sqlx::Error> {
    fn into_store_error(self) -> StoreResult<T> {
        self.map_err(|e| match e {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".into()),
            other => StoreError::Database(other.to_string()),
        })
    }
}

impl From<StoreError> for conduit_core::CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(m) => conduit_core::CoreError::not_found(m),
            StoreError::Validation(m) => conduit_core::CoreError::validation(m),
            StoreError::Database(m) | StoreError::Migration { message: m, .. } => {
                conduit_core::CoreError::internal(m)
            }
        }
    }
}

/// Returns `true` when a migration failure is the expected "already applied" shape SQLite
/// reports for a rerun of `ADD COLUMN`/`CREATE TABLE` — SQLite has no dedicated duplicate
/// error code, so this matches on the driver's message text.
pub fn is_benign_rerun_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("duplicate column name")
        || lower.contains("already exists")
        || lower.contains("table") && lower.contains("already")
}
