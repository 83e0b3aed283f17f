//! Error types for larva-store.

use std::path::PathBuf;

/// Result type for larva-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in larva-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A row violated a uniqueness or reference constraint.
    ///
    /// On insert this means an identifier was handed out twice, which points
    /// at a counter allocation bug rather than bad input.
    #[error("Integrity violation on {entity}: {detail}")]
    Integrity { entity: &'static str, detail: String },

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A process-state value could not be interpreted.
    #[error("Invalid value {value:?} stored under {key}")]
    InvalidState { key: String, value: String },
}

impl Error {
    /// Classify an insert failure, separating constraint violations from other
    /// database errors.
    pub(crate) fn from_insert(entity: &'static str, err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::Integrity {
                    entity,
                    detail: message.clone().unwrap_or_else(|| code.to_string()),
                }
            }
            _ => Error::Database(err),
        }
    }
}
