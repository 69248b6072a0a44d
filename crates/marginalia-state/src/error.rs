//! Error types for the persistence store.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite failure — surfaced upward, never coerced to OK.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Unique/primary-key violation on insert (id collision, duplicate
    /// user email).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}

impl StoreError {
    /// Map constraint violations on insert to [`StoreError::Conflict`],
    /// leaving everything else as a raw SQLite error.
    pub(crate) fn from_insert(err: rusqlite::Error, what: &str) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(what.to_string())
            }
            _ => StoreError::Sqlite(err),
        }
    }
}
