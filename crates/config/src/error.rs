//! Config Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("config file not found: {}", _0.display())]
    FileNotFound(#[error(not(source))] PathBuf),
    /// A layer could not be parsed or extracted.
    #[display("could not load configuration")]
    Load,
    #[display("invalid value for `{key}`: {reason}")]
    Invalid {
        #[error(not(source))]
        key: &'static str,
        #[error(not(source))]
        reason: String,
    },
    /// No home directory to derive default paths from.
    #[display("could not determine the platform data directory")]
    NoDirectories,
    #[display("storage backend `{_0}` is not available in this build")]
    UnsupportedBackend(#[error(not(source))] &'static str),
    #[display("could not set up object storage")]
    Storage,
    #[display("could not open the records database")]
    Database,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database | Self::Storage)
    }

    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { key, reason: reason.into() }
    }
}
