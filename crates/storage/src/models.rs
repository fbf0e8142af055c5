//! Storage models.
//!
//! These types describe stored objects (for listing and orphan detection) and
//! the image formats the uploader knows how to label.

use derive_more::Display;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Image format of a stored object, as far as its name tells.
///
/// Unknown or missing extensions fall back to [`Jpeg`](Self::Jpeg).
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash)]
pub enum ContentType {
    #[default]
    #[display("image/jpeg")]
    Jpeg,
    #[display("image/png")]
    Png,
    #[display("image/gif")]
    Gif,
    #[display("image/webp")]
    Webp,
}
impl ContentType {
    /// Detect the content type from a bare extension (without the dot).
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "png" => Self::Png,
            "gif" => Self::Gif,
            "webp" => Self::Webp,
            _ => Self::Jpeg,
        }
    }

    /// Detect the content type from a file extension.
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or_default()
    }

    /// Detect the content type from a file reference that may carry a URL
    /// query string or fragment (`photo.PNG?width=200` is a PNG).
    #[must_use]
    pub fn from_reference(reference: &str) -> Self {
        let trimmed = reference.split(['?', '#']).next().unwrap_or_default();
        let name = trimmed.rsplit('/').next().unwrap_or_default();
        match name.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() => Self::from_extension(ext),
            _ => Self::Jpeg,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
        }
    }

    /// Canonical extension used when naming newly uploaded objects.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }
}

/// What to do when an upload targets a path that already holds an object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail with [`AlreadyExists`](crate::error::ErrorKind::AlreadyExists).
    #[default]
    CreateNew,
    /// Replace the existing object.
    Overwrite,
}

/// Object metadata returned by storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Relative path from storage root
    pub path: PathBuf,
    /// Object size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
    pub content_type: ContentType,
}
impl ObjectInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: OffsetDateTime) -> Self {
        let path = path.into();
        let content_type = ContentType::from_path(&path);
        Self { path, size, modified, content_type }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("meme.png", ContentType::Png)]
    #[case("meme.PNG", ContentType::Png)]
    #[case("dir/meme.gif", ContentType::Gif)]
    #[case("meme.webp", ContentType::Webp)]
    #[case("meme.jpg", ContentType::Jpeg)]
    #[case("meme.jpeg", ContentType::Jpeg)]
    #[case("meme.heic", ContentType::Jpeg)]
    #[case("meme", ContentType::Jpeg)]
    fn test_from_path(#[case] path: &str, #[case] expected: ContentType) {
        assert_eq!(ContentType::from_path(path), expected);
    }

    #[rstest]
    #[case("file:///tmp/cache/IMG_0001.PNG", ContentType::Png)]
    #[case("/tmp/photo.webp?width=200", ContentType::Webp)]
    #[case("/tmp/photo.gif#frame", ContentType::Gif)]
    #[case("/tmp.d/photo", ContentType::Jpeg)]
    #[case("/tmp/photo.", ContentType::Jpeg)]
    #[case("", ContentType::Jpeg)]
    fn test_from_reference(#[case] reference: &str, #[case] expected: ContentType) {
        assert_eq!(ContentType::from_reference(reference), expected);
    }

    #[test]
    fn test_mime_and_extension() {
        assert_eq!(ContentType::Jpeg.mime(), "image/jpeg");
        assert_eq!(ContentType::Jpeg.extension(), "jpg");
        assert_eq!(ContentType::Webp.to_string(), "image/webp");
    }

    #[test]
    fn test_object_info_detects_content_type() {
        let info = ObjectInfo::new("user/1-abc.gif", 10, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(info.content_type, ContentType::Gif);
    }
}
