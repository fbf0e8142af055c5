//! Stored objects that no image record refers to.
//!
//! These are left behind when an upload succeeds but the image record can't
//! be created. Objects younger than a minimum age are ignored, since they may
//! belong to an upload whose record is still being written.

use crate::context::Context;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use futures::TryStreamExt;
use memefold_records::UserId;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use time::{Duration, OffsetDateTime};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Orphan {
    pub path: PathBuf,
    pub size: u64,
    pub modified: OffsetDateTime,
}

/// Outcome of [`remove_orphans`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Removed {
    pub objects: usize,
    pub bytes: u64,
    /// Orphans that could not be deleted.
    pub failed: usize,
}

/// List objects under `user`'s prefix that no image record refers to and
/// that are at least `min_age` old.
#[tracing::instrument(skip_all, fields(user = %user))]
pub async fn find_orphans(context: &Context, user: &UserId, min_age: Duration) -> Result<Vec<Orphan>> {
    let referenced: HashSet<PathBuf> = context
        .records
        .list_images(user)
        .await
        .or_raise(|| ErrorKind::Remote)?
        .into_iter()
        .filter_map(|image| image.storage_path.map(PathBuf::from))
        .collect();
    let cutoff = OffsetDateTime::now_utc() - min_age;
    let prefix = Path::new(user.as_str());

    let mut orphans = Vec::new();
    let mut objects = context.storage.list_stream(Some(prefix));
    while let Some(info) = objects.try_next().await.or_raise(|| ErrorKind::Remote)? {
        if referenced.contains(&info.path) || info.modified > cutoff {
            continue;
        }
        orphans.push(Orphan { path: info.path, size: info.size, modified: info.modified });
    }
    orphans.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!(referenced = referenced.len(), orphans = orphans.len(), "scanned stored objects");
    Ok(orphans)
}

/// Delete what [`find_orphans`] finds. Objects that can't be deleted are
/// logged and counted, not treated as errors.
#[tracing::instrument(skip_all, fields(user = %user))]
pub async fn remove_orphans(context: &Context, user: &UserId, min_age: Duration) -> Result<Removed> {
    let mut removed = Removed::default();
    for orphan in find_orphans(context, user, min_age).await? {
        match context.storage.delete(&orphan.path).await {
            Ok(()) => {
                removed.objects += 1;
                removed.bytes += orphan.size;
            },
            Err(err) => {
                tracing::warn!(path = %orphan.path.display(), error = %err, "could not delete orphaned object");
                removed.failed += 1;
            },
        }
    }
    tracing::info!(objects = removed.objects, bytes = removed.bytes, "removed orphaned objects");
    Ok(removed)
}
