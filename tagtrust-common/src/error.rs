//! Common error types for TagTrust

use thiserror::Error;

/// Common result type for TagTrust operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the tagging engine and its HTTP surface
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Empty entity name, malformed attributes, bad identifiers
    #[error("Validation error: {0}")]
    Validation(String),

    /// A pending or approved tag already exists for (content, name, submitter)
    #[error("Duplicate tag: {0}")]
    Duplicate(String),

    /// Caller is not the submitter of the tag
    #[error("Not owner: {0}")]
    NotOwner(String),

    /// Caller lacks the role required for the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Tag has already left the pending state
    #[error("Tag already decided: {0}")]
    AlreadyDecided(String),

    /// Lost a race against a concurrent moderation of the same tag
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Lock contention did not clear within the retry budget; nothing was committed
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for SQLite busy/locked errors that a retry may clear
    pub fn is_lock_contention(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db_err)) => {
                // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_BUSY_SNAPSHOT (517)
                matches!(db_err.code().as_deref(), Some("5") | Some("6") | Some("517"))
                    || db_err.message().contains("database is locked")
            }
            Error::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }

    /// True when the database rejected a write on a UNIQUE constraint
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(format!("JSON error: {}", err))
    }
}
