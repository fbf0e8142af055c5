//! Records Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. `sqlx` errors are kept as children
//! of the frame that raised them.

use derive_more::{Display, Error};

/// A records error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for records operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    #[display("folder not found: {_0}")]
    FolderNotFound(#[error(not(source))] String),
    #[display("image not found: {_0}")]
    ImageNotFound(#[error(not(source))] String),
    #[display("no profile for user: {_0}")]
    ProfileNotFound(#[error(not(source))] String),
    /// The change would leave rows referencing something that no longer exists.
    #[display("record is still referenced")]
    Constraint,
    /// Stored data could not be converted into a model.
    #[display("invalid record data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// The database file doesn't hold what the record store relies on.
    #[display("record database failed integrity check: {_0}")]
    Integrity(#[error(not(source))] &'static str),
    /// The store could not be reached.
    #[display("record store unavailable: {_0}")]
    Unavailable(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database | Self::Unavailable(_))
    }

    /// Pick a kind for a failed query and keep the `sqlx` error as a child.
    #[track_caller]
    pub(crate) fn query(err: sqlx::Error) -> Error {
        let kind = match &err {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => Self::Constraint,
            _ => Self::Database,
        };
        exn::Exn::from(err).raise(kind)
    }
}
