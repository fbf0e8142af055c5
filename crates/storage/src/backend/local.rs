//! Local filesystem storage backend.
//!
//! This module provides a storage backend implementation for the local filesystem.
//! Objects are stored in a configured directory and accessed using standard filesystem
//! operations via `tokio::fs` for async I/O. Some other process (a web server, a
//! CDN origin) is expected to serve that directory under the configured public URL.

use crate::backend::{ObjectInfoStream, is_http_url, join_url};
use crate::error::ErrorKind;
use crate::path::{to_key, validate as validate_path};
use crate::{ContentType, ObjectInfo, StorageBackend, WriteMode, error::Result};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::{Metadata, create_dir_all as sync_create_dir};
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};
use tokio::io::AsyncWriteExt;

enum WalkEntry {
    File(ObjectInfo),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem storage backend.
///
/// Stores objects in a directory on the local filesystem. All paths are relative
/// to the configured root directory.
///
/// # Examples
///
/// ```no_run
/// use memefold_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("local", "/srv/memefold/objects", "http://localhost:8080/objects")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    /// Root directory for stored objects
    root: PathBuf,
    /// Base URL the root directory is served under
    public_url: String,
}
impl LocalBackend {
    /// Create a new local filesystem backend.
    ///
    /// # Arguments
    /// * `root` - Absolute path to the object root directory
    /// * `public_url` - `http://` or `https://` base URL that `root` is served under
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, is not a directory, or
    /// the public URL is not an HTTP(S) URL.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>, public_url: impl Into<String>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        let public_url = public_url.into();
        if !is_http_url(&public_url) {
            exn::bail!(ErrorKind::BackendError(format!("public URL `{public_url}` is not an http(s) URL")));
        }

        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::InvalidPath(root));
            }
        } else {
            // Use non-async here; it'll only happen once on startup and it's
            // not worth the hassle of making the constructor async.
            sync_create_dir(&root).map_err(|e| Self::map_io_error(e, &root))?;
        }

        Ok(Self { name: name.into(), root, public_url })
    }

    /// Get the absolute path for a relative storage path.
    ///
    /// Validates the path and joins it with the root directory.
    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    /// Convert an absolute path back to a relative storage path.
    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        if !absolute.is_absolute() {
            exn::bail!(ErrorKind::BackendError(format!(
                "attempting to get relative path of non-absolute path `{:?}`",
                absolute
            )))
        }
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{:?}` is not within root `{:?}`", absolute, self.root))
        })?;
        // Validate path will also normalize it.
        Ok(validate_path(relative)?)
    }

    /// Listing entry for a file, from its metadata.
    fn metadata(path: &Path, metadata: Metadata) -> Result<ObjectInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?.into();
        Ok(ObjectInfo::new(path, metadata.len(), modified))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            std::io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Pulled out of the listing stream, where errors can't be `?`'d and
    /// have to be yielded instead.
    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        let metadata = entry.metadata().await.map_err(|e| Self::map_io_error(e, &path))?;
        let relative = self.relative_path(&path)?;
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if metadata.is_file() {
            return Ok(WalkEntry::File(Self::metadata(&relative, metadata)?));
        }
        // Note: silently drop what is most likely a broken symlink.
        Ok(WalkEntry::Skip)
    }

    async fn create_new(abs_path: &Path, path: &Path, data: &[u8]) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(abs_path)
            .await
            .map_err(|e| Self::map_io_error(e, path))?;
        let written = async {
            file.write_all(data).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            // Don't leave a truncated object behind for the next attempt to collide with.
            if let Err(cleanup) = fs::remove_file(abs_path).await {
                tracing::warn!(path = %path.display(), error = %cleanup, "could not remove partially written object");
            }
            exn::bail!(Self::map_io_error(e, path));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> ObjectInfoStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };

        // Walk from the parent directory of the prefix path, so a prefix whose
        // leaf doesn't exist yet (or is a file) still lists cleanly.
        let start_dir = validated_prefix
            .as_ref()
            .map(|prefix| self.root.join(prefix).parent().unwrap_or(&self.root).to_path_buf())
            .unwrap_or_else(|| self.root.clone());
        let mut stack = vec![start_dir];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // Same as object stores: listing a missing directory is
                    // an empty list, not an error.
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)));
                        continue 'dirs;
                    }
                };

                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &current))); continue 'entries; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn upload(&self, path: &Path, data: &[u8], content_type: ContentType, mode: WriteMode) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        // Create parent directories if needed, to keep behaviour
        // consistent with S3-compatible storage.
        if let Some(parent) = abs_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| Self::map_io_error(e, path))?;
        }
        match mode {
            WriteMode::CreateNew => Self::create_new(&abs_path, path, data).await?,
            WriteMode::Overwrite => fs::write(&abs_path, data).await.map_err(|e| Self::map_io_error(e, path))?,
        }
        tracing::debug!(backend = %self.name, path = %path.display(), size = data.len(), %content_type, "stored object");
        Ok(())
    }

    async fn public_url(&self, path: &Path) -> Result<String> {
        let validated = validate_path(path)?;
        Ok(join_url(&self.public_url, &to_key(&validated)))
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_file(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;

    use super::*;

    const BASE: &str = "http://localhost:8080/objects";

    fn backend(dir: &tempfile::TempDir) -> LocalBackend {
        LocalBackend::new("name", dir.path(), BASE).unwrap()
    }

    fn stored(dir: &tempfile::TempDir, path: &str) -> Option<Vec<u8>> {
        std::fs::read(dir.path().join(path)).ok()
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("name", temp_dir.path(), BASE).is_ok());
        assert!(LocalBackend::new("name", "relative/path", BASE).is_err());
        assert!(LocalBackend::new("name", "./relative", BASE).is_err());
    }

    #[test]
    fn test_new_requires_http_public_url() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalBackend::new("name", temp_dir.path(), "https://cdn.example.com").is_ok());
        assert!(LocalBackend::new("name", temp_dir.path(), "file:///srv/objects").is_err());
        assert!(LocalBackend::new("name", temp_dir.path(), "").is_err());
    }

    #[test]
    fn test_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = backend(&temp_dir);
        let expected = temp_dir.path().join("user-1/meme.png");
        assert_eq!(backend.absolute_path(Path::new("user-1/meme.png")).unwrap(), expected);
        assert!(backend.absolute_path(Path::new("../etc/passwd")).is_err());
    }

    #[test]
    fn test_relative_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = backend(&temp_dir);
        let abs = temp_dir.path().join("user-1/meme.png");
        assert_eq!(backend.relative_path(&abs).unwrap(), Path::new("user-1/meme.png"));
        assert!(backend.relative_path(PathBuf::from("/other/meme.png")).is_err());
    }

    #[tokio::test]
    async fn test_upload_creates_parents() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = backend(&temp_dir);
        let path = Path::new("user-1/a/b/meme.png");
        backend.upload(path, b"\x89PNG", ContentType::Png, WriteMode::CreateNew).await.unwrap();
        assert_eq!(stored(&temp_dir, "user-1/a/b/meme.png").unwrap(), b"\x89PNG");
    }

    #[tokio::test]
    async fn test_upload_create_new_refuses_existing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = backend(&temp_dir);
        let path = Path::new("user-1/meme.jpg");
        backend.upload(path, b"first", ContentType::Jpeg, WriteMode::CreateNew).await.unwrap();
        let err = backend.upload(path, b"second", ContentType::Jpeg, WriteMode::CreateNew).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::AlreadyExists(_)));
        // The original object is untouched
        assert_eq!(stored(&temp_dir, "user-1/meme.jpg").unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_upload_overwrite_replaces() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = backend(&temp_dir);
        let path = Path::new("user-1/meme.jpg");
        backend.upload(path, b"first", ContentType::Jpeg, WriteMode::CreateNew).await.unwrap();
        backend.upload(path, b"second", ContentType::Jpeg, WriteMode::Overwrite).await.unwrap();
        assert_eq!(stored(&temp_dir, "user-1/meme.jpg").unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_public_url() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new("name", temp_dir.path(), "http://localhost:8080/objects/").unwrap();
        let url = backend.public_url(Path::new("user-1//meme.png")).await.unwrap();
        assert_eq!(url, "http://localhost:8080/objects/user-1/meme.png");
        assert!(backend.public_url(Path::new("../meme.png")).await.is_err());
    }

    #[tokio::test]
    async fn test_delete() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = backend(&temp_dir);
        let path = Path::new("user-1/meme.gif");
        backend.upload(path, b"GIF89a", ContentType::Gif, WriteMode::CreateNew).await.unwrap();
        backend.delete(path).await.unwrap();
        assert_eq!(stored(&temp_dir, "user-1/meme.gif"), None);
        // Deleting a missing object returns an error
        let err = backend.delete(path).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_reports_metadata() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = backend(&temp_dir);
        let data = b"RIFF....WEBP";
        backend.upload(Path::new("user-1/meme.webp"), data, ContentType::Webp, WriteMode::CreateNew).await.unwrap();
        let files = backend.list(None).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("user-1/meme.webp"));
        assert_eq!(files[0].size, data.len() as u64);
        assert_eq!(files[0].content_type, ContentType::Webp);
    }

    #[tokio::test]
    async fn test_list_empty_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = backend(&temp_dir);
        assert!(backend.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = backend(&temp_dir);
        for path in ["user-1/a.png", "user-1/b.png", "user-10/c.png", "user-2/d.png"] {
            backend.upload(Path::new(path), b"data", ContentType::Png, WriteMode::CreateNew).await.unwrap();
        }
        assert_eq!(backend.list(None).await.unwrap().len(), 4);
        let mut paths: Vec<_> =
            backend.list(Some(Path::new("user-1"))).await.unwrap().into_iter().map(|f| f.path).collect();
        paths.sort();
        assert_eq!(paths, vec![PathBuf::from("user-1/a.png"), PathBuf::from("user-1/b.png")]);
    }

    #[tokio::test]
    async fn test_list_nested_prefix() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = backend(&temp_dir);
        backend.upload(Path::new("a/b/c/deep.png"), b"data", ContentType::Png, WriteMode::CreateNew).await.unwrap();
        backend.upload(Path::new("a/other.png"), b"data", ContentType::Png, WriteMode::CreateNew).await.unwrap();
        let files = backend.list(Some(Path::new("a/b"))).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, PathBuf::from("a/b/c/deep.png"));
    }

    #[tokio::test]
    async fn test_list_nonexistent_prefix() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = backend(&temp_dir);
        assert!(backend.list(Some(Path::new("nobody/"))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_security() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = backend(&temp_dir);
        assert!(backend.public_url(Path::new("etc/../../passwd")).await.is_err());
        assert!(
            backend
                .upload(Path::new("../etc/passwd"), b"data", ContentType::Jpeg, WriteMode::Overwrite)
                .await
                .is_err()
        );
        assert!(backend.delete(Path::new("../../file")).await.is_err());
    }
}
