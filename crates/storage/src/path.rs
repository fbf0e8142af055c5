//! Path validation and security utilities.
//!
//! Object paths come from user ids and generated names, so they are checked
//! here before any backend touches them.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a storage path for security and correctness.
/// Ensures that paths don't escape the storage root (no `..` traversal).
///
/// > **Note:** This does **not** normalize backslashes, non-UTF8 bytes, or
/// >           platform-specific weirdness. Null bytes are explicitly rejected.
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath)
/// if invalid.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use memefold_storage::validate_path;
/// // Valid paths
/// assert!(validate_path("user-1/1700000000000-abc.png").is_ok());
/// assert!(validate_path("user-1/../user-1/meme.png").is_ok()); // (never leaves root)
/// // Invalid paths
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("user-1/../../b").is_err()); // (leaves root)
/// assert!(validate_path("a\0b").is_err());
/// // Paths get resolved
/// assert_eq!(
///     validate_path("user-1/./other/..//meme.png/").unwrap(),
///     Path::new("user-1/meme.png")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but
                // truncate in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// Render a validated path as the `/`-separated key used in URLs and
/// object store keys.
pub(crate) fn to_key(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        assert_eq!(validate(Path::new("user-1/123-abc.png")).unwrap(), Path::new("user-1/123-abc.png"));
        assert_eq!(validate(Path::new("a/b/c/meme.gif")).unwrap(), Path::new("a/b/c/meme.gif"));
        assert_eq!(validate(Path::new("meme.jpg")).unwrap(), Path::new("meme.jpg"));
    }

    #[test]
    fn test_path_normalization() {
        assert_eq!(validate(Path::new("a//b//c")).unwrap(), Path::new("a/b/c"));
        assert_eq!(validate(Path::new("a/./b/./c")).unwrap(), Path::new("a/b/c"));
        assert_eq!(validate(Path::new("/user-1/meme.png")).unwrap(), Path::new("user-1/meme.png"));
    }

    #[test]
    fn test_traversal_attempts() {
        assert!(validate(Path::new("../etc/passwd")).is_err());
        assert!(validate(Path::new("a/../../b")).is_err());
        assert!(validate(Path::new("..")).is_err());
        assert!(validate(Path::new("../..")).is_err());
        // Stays within the root
        assert_eq!(validate(Path::new("a/b/..")).unwrap(), Path::new("a"));
    }

    #[test]
    fn test_invalid_characters() {
        assert!(validate(Path::new("a\0b")).is_err());
        assert!(validate(Path::new("\0")).is_err());
    }

    #[test]
    fn test_empty_paths() {
        assert!(validate(Path::new("")).is_err());
        assert!(validate(Path::new(".")).is_err());
        assert!(validate(Path::new("./")).is_err());
        assert!(validate(Path::new("//")).is_err());
    }

    #[test]
    fn test_trailing_slashes() {
        assert_eq!(validate(Path::new("user-1/")).unwrap(), Path::new("user-1"));
        assert_eq!(validate(Path::new("user-1///")).unwrap(), Path::new("user-1"));
    }

    #[test]
    fn test_to_key() {
        let path = validate("user-1//nested/./meme.png").unwrap();
        assert_eq!(to_key(&path), "user-1/nested/meme.png");
    }
}
