//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a unified
//! interface for object storage across different backends (local filesystem,
//! S3-compatible services, etc.).

mod local;
#[cfg(feature = "mock")]
mod mock;
#[cfg(feature = "s3")]
mod s3;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::{MockBackend, Operation};
#[cfg(feature = "s3")]
pub use self::s3::S3Backend;
use crate::error::Result;
use crate::models::{ContentType, ObjectInfo, WriteMode};
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

type ObjectInfoStream<'a> = Pin<Box<dyn Stream<Item = Result<ObjectInfo>> + Send + 'a>>;

/// Unified interface for image object storage.
///
/// All storage operations are asynchronous. Objects are written whole (no
/// streaming) and are addressed by a relative path; each backend knows how
/// to turn that path into a URL that a client can fetch.
///
/// # Path Handling
/// All paths are relative to the storage root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations should
/// enforce this validation.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use memefold_storage::{backend::StorageBackend, error::Result, ContentType, WriteMode};
///
/// async fn publish(backend: &dyn StorageBackend, bytes: &[u8]) -> Result<String> {
///     let path = Path::new("user-1/1700000000000-abcdefghij.png");
///     backend.upload(path, bytes, ContentType::Png, WriteMode::CreateNew).await?;
///     backend.public_url(path).await
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the configured backend. Used for logging only.
    fn name(&self) -> &str;

    /// List all objects matching an optional prefix.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_stream()`](Self::list_stream) into a [`Vec`] before
    /// returning.
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<ObjectInfo>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream object metadata matching an optional prefix.
    ///
    /// Prefixes match whole path components, so the prefix `user-1` matches
    /// `user-1/meme.png` but not `user-10/meme.png`. Listing a prefix that
    /// holds nothing yields an empty stream rather than an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// use std::path::Path;
    /// # use memefold_storage::{backend::StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut stream = backend.list_stream(Some(Path::new("user-1")));
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}: {} bytes", info.path.display(), info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> ObjectInfoStream<'a>;

    /// Store an object.
    ///
    /// With [`WriteMode::CreateNew`] an existing object at `path` is left
    /// untouched and [`AlreadyExists`](crate::error::ErrorKind::AlreadyExists)
    /// is returned.
    ///
    /// # Notes
    /// - Implementations should create parent directories as needed.
    async fn upload(&self, path: &Path, data: &[u8], content_type: ContentType, mode: WriteMode) -> Result<()>;

    /// Publicly resolvable URL for an object. Always `http://` or `https://`.
    ///
    /// This does not check that the object exists.
    async fn public_url(&self, path: &Path) -> Result<String>;

    /// Delete an object.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the object
    /// does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;
}

/// Join a public base URL and an object key with exactly one slash.
pub(crate) fn join_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/'))
}

/// Only `http://` and `https://` bases produce URLs the uploader treats as
/// already hosted.
pub(crate) fn is_http_url(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
