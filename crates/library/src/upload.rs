//! Image uploads.
//!
//! A local file is measured, quota-checked, read into memory and written to
//! object storage under a freshly generated path. References that are already
//! hosted (`http://` or `https://`) are passed through untouched.

use crate::context::Context;
use crate::error::{ErrorKind, Result, UploadFailure};
use crate::quota::check_limit;
use exn::ResultExt;
use memefold_records::UserId;
use memefold_storage::error::ErrorKind as StorageErrorKind;
use memefold_storage::{ContentType, WriteMode};
use rand::Rng;
use rand::distr::Alphanumeric;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

const SUFFIX_LEN: usize = 10;

/// A durable reference to uploaded image bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upload {
    pub url: String,
    /// Measured size; `None` for references that were already hosted.
    pub size: Option<u64>,
    /// Where the bytes were stored; `None` for references that were already
    /// hosted.
    pub storage_path: Option<PathBuf>,
}

/// Whether a reference already points at hosted content.
pub fn is_remote(reference: &str) -> bool {
    let lower = reference.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Upload a local image for `user` and return its public URL.
///
/// # Size
///
/// The size is taken from filesystem metadata. When that isn't available the
/// size is treated as unknown (0) and the quota check is deferred until the
/// bytes have been read; the check still happens before anything is
/// transferred.
///
/// # Errors
///
/// Nothing is written to storage when any check fails. A failure after the
/// transfer (resolving the public URL) leaves the stored object behind; see
/// [`find_orphans`](crate::find_orphans).
#[tracing::instrument(skip_all, fields(user = %user))]
pub async fn upload(context: &Context, user: &UserId, reference: &str) -> Result<Upload> {
    if is_remote(reference) {
        tracing::debug!(url = reference, "already hosted, skipping upload");
        return Ok(Upload { url: reference.to_string(), size: None, storage_path: None });
    }
    let local = Path::new(reference.strip_prefix("file://").unwrap_or(reference));

    let mut size = match tokio::fs::metadata(local).await {
        Ok(metadata) => metadata.len(),
        Err(err) => {
            tracing::warn!(path = %local.display(), error = %err, "could not determine file size");
            0
        },
    };
    if size > 0 {
        check_limit(context.records.as_ref(), &context.limits, user, size).await.into_result()?;
    }

    let data = tokio::fs::read(local).await.or_raise(|| ErrorKind::Upload(UploadFailure::Read))?;
    let read = data.len() as u64;
    if size == 0 && read > 0 {
        size = read;
        check_limit(context.records.as_ref(), &context.limits, user, size).await.into_result()?;
    }

    let content_type = ContentType::from_path(local);
    let path = object_path(user, content_type);
    context.storage.upload(&path, &data, content_type, WriteMode::CreateNew).await.map_err(|err| {
        let failure = match &*err {
            StorageErrorKind::AlreadyExists(_) => UploadFailure::Collision,
            _ => UploadFailure::Transfer,
        };
        err.raise(ErrorKind::Upload(failure))
    })?;
    let url = context.storage.public_url(&path).await.or_raise(|| ErrorKind::Upload(UploadFailure::PublicUrl))?;
    tracing::info!(path = %path.display(), size, backend = context.storage.name(), "uploaded image");
    Ok(Upload { url, size: Some(size), storage_path: Some(path) })
}

/// `{user}/{unix millis}-{random suffix}.{extension}`
fn object_path(user: &UserId, content_type: ContentType) -> PathBuf {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    PathBuf::from(user.as_str()).join(format!("{millis}-{suffix}.{}", content_type.extension()))
}
