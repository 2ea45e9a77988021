use thiserror::Error;
use trojan_shared::IdError;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON column (image lists, listing snapshots) failed to encode or decode.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The referenced record does not exist. Carries the entity kind.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A required field is missing or malformed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A client-supplied identifier could not be parsed.
    #[error(transparent)]
    InvalidId(#[from] IdError),

    /// The caller does not own the record it tried to change.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Signup with an email that is already registered.
    #[error("An account already exists with this email")]
    EmailTaken,

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
