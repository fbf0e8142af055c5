//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Failures from the record store and
//! object storage are kept as children of the frame that raised them, so the
//! full chain is available when printing with `{:?}`.

use derive_more::{Display, Error};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What went wrong, grouped by what the caller can do about it.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("folder name must not be empty")]
    EmptyName,
    #[display("a folder named \"{_0}\" already exists")]
    DuplicateName(#[error(not(source))] String),
    #[display("new order must contain every image in the folder exactly once")]
    InvalidOrder,
    #[display("operation not permitted on the Favorites folder")]
    DerivedFolder,
    #[display("folder not found: {_0}")]
    FolderNotFound(#[error(not(source))] String),
    #[display("image not found: {_0}")]
    ImageNotFound(#[error(not(source))] String),
    #[display("{_0}")]
    LimitExceeded(#[error(not(source))] Limit),
    /// A record store call failed. The store's error is the child frame.
    #[display("remote store request failed")]
    Remote,
    #[display("upload failed: {_0}")]
    Upload(#[error(not(source))] UploadFailure),
    /// No user is signed in, or loading hasn't finished.
    #[display("folders are not loaded")]
    NotLoaded,
    /// The session that started the operation was signed out (or replaced)
    /// before the result could be applied.
    #[display("session ended before the operation completed")]
    SessionEnded,
}

/// The limit that a rejected operation would have exceeded.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Limit {
    #[display("folder limit reached ({limit} folders)")]
    Folders { limit: usize },
    #[display("folder is full ({limit} images)")]
    ImagesPerFolder { limit: usize },
    #[display("file is too large ({} > {})", crate::format_bytes(*size), crate::format_bytes(*max))]
    FileSize { size: u64, max: u64 },
    #[display(
        "storage limit exceeded ({} used of {}, {} requested)",
        crate::format_bytes(*used),
        crate::format_bytes(*limit),
        crate::format_bytes(*requested)
    )]
    Storage { used: u64, limit: u64, requested: u64 },
}

/// The step of an upload that failed.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum UploadFailure {
    #[display("could not verify storage")]
    Unverified,
    #[display("could not read local file")]
    Read,
    #[display("could not transfer file")]
    Transfer,
    #[display("an object already exists at the generated path")]
    Collision,
    #[display("could not resolve a public URL")]
    PublicUrl,
}

/// Coarse grouping of [`ErrorKind`] for caller-side messaging.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Category {
    #[display("validation error")]
    Validation,
    #[display("limit exceeded")]
    LimitExceeded,
    #[display("remote error")]
    Remote,
    #[display("upload error")]
    Upload,
    #[display("programming error")]
    State,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote => true,
            Self::Upload(failure) => matches!(failure, UploadFailure::Unverified | UploadFailure::Transfer | UploadFailure::PublicUrl),
            _ => false,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Self::EmptyName
            | Self::DuplicateName(_)
            | Self::InvalidOrder
            | Self::DerivedFolder
            | Self::FolderNotFound(_)
            | Self::ImageNotFound(_) => Category::Validation,
            Self::LimitExceeded(_) => Category::LimitExceeded,
            Self::Remote => Category::Remote,
            Self::Upload(_) => Category::Upload,
            Self::NotLoaded | Self::SessionEnded => Category::State,
        }
    }
}
