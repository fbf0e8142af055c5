//! SQLite-backed record store.
//!
//! Folders, images and profiles live in one database. Image writes and the
//! account's storage counter are updated in the same transaction, so the
//! counter can't drift from the rows it sums.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{
    FolderId, FolderRecord, FolderRow, FolderUpdate, ImageId, ImageRecord, ImageRow, ImageUpdate, NewFolder, NewImage,
    StorageUsage, UsageRow, UserId,
};
use crate::store::RecordStore;
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use sqlx::SqlitePool;
use time::UtcDateTime;
use uuid::Uuid;

/// Repository for folder, image and profile rows.
///
/// # Relationships
///
/// - Images reference exactly one folder; a folder can't be deleted while
///   any image references it.
/// - Profiles are keyed by user and hold the account's storage counters.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn to_i64(value: u64, field: &'static str) -> Result<i64> {
        i64::try_from(value).or_raise(|| ErrorKind::InvalidData(field))
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    /// Create the profile row for a user if it doesn't exist yet.
    ///
    /// New profiles have no usage and no explicit limit.
    pub async fn ensure_profile(&self, user: &UserId) -> Result<()> {
        sqlx::query(include_str!("../queries/ensure_profile.sql"))
            .bind(user.as_str())
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Set (or with `None`, clear) the account's storage limit.
    pub async fn set_storage_limit(&self, user: &UserId, limit: Option<u64>) -> Result<()> {
        let limit = limit.map(|l| Self::to_i64(l, "storage limit")).transpose()?;
        let result = sqlx::query(include_str!("../queries/set_storage_limit.sql"))
            .bind(limit)
            .bind(user.as_str())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::ProfileNotFound(user.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for Repository {
    // =========================================================================
    // Folders
    // =========================================================================

    async fn list_folders(&self, user: &UserId) -> Result<Vec<FolderRecord>> {
        let rows: Vec<FolderRow> = sqlx::query_as(include_str!("../queries/list_folders.sql"))
            .bind(user.as_str())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(FolderRecord::try_from).collect()
    }

    async fn create_folder(&self, folder: NewFolder) -> Result<FolderRecord> {
        let row: FolderRow = sqlx::query_as(include_str!("../queries/insert_folder.sql"))
            .bind(Uuid::new_v4().to_string())
            .bind(folder.user_id.as_str())
            .bind(&folder.name)
            .bind(&folder.color)
            .bind(UtcDateTime::now().unix_timestamp())
            .fetch_one(&self.pool)
            .await
            .map_err(ErrorKind::query)?;
        let record = FolderRecord::try_from(row)?;
        tracing::debug!(folder = %record.id, user = %record.user_id, "created folder");
        Ok(record)
    }

    async fn update_folder(&self, id: &FolderId, update: FolderUpdate) -> Result<FolderRecord> {
        let row: Option<FolderRow> = sqlx::query_as(include_str!("../queries/update_folder.sql"))
            .bind(update.name)
            .bind(update.color)
            .bind(update.is_public)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(ErrorKind::query)?;
        row.ok_or_raise(|| ErrorKind::FolderNotFound(id.to_string()))?.try_into()
    }

    async fn delete_folder(&self, id: &FolderId) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/delete_folder.sql"))
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(ErrorKind::query)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::FolderNotFound(id.to_string()));
        }
        tracing::debug!(folder = %id, "deleted folder");
        Ok(())
    }

    // =========================================================================
    // Images
    // =========================================================================

    async fn list_images(&self, user: &UserId) -> Result<Vec<ImageRecord>> {
        let rows: Vec<ImageRow> = sqlx::query_as(include_str!("../queries/list_images.sql"))
            .bind(user.as_str())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(ImageRecord::try_from).collect()
    }

    async fn create_image(&self, image: NewImage) -> Result<ImageRecord> {
        let size = image.file_size_bytes.map(|s| Self::to_i64(s, "file size")).transpose()?;
        let now = UtcDateTime::now().unix_timestamp();
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let row: ImageRow = sqlx::query_as(include_str!("../queries/insert_image.sql"))
            .bind(Uuid::new_v4().to_string())
            .bind(image.user_id.as_str())
            .bind(image.folder_id.as_str())
            .bind(&image.url)
            .bind(image.is_favorite)
            .bind(image.position)
            .bind(size)
            .bind(&image.storage_path)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| match ErrorKind::query(e) {
                // The only foreign key on images is the folder.
                err if matches!(&*err, ErrorKind::Constraint) => {
                    err.raise(ErrorKind::FolderNotFound(image.folder_id.to_string()))
                },
                err => err,
            })?;
        if let Some(size) = size.filter(|s| *s > 0) {
            sqlx::query(include_str!("../queries/add_storage_used.sql"))
                .bind(image.user_id.as_str())
                .bind(size)
                .bind(now)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        let record = ImageRecord::try_from(row)?;
        tracing::debug!(image = %record.id, folder = %record.folder_id, size = ?record.file_size_bytes, "created image");
        Ok(record)
    }

    async fn update_image(&self, id: &ImageId, update: ImageUpdate) -> Result<ImageRecord> {
        let folder_id = update.folder_id.clone();
        let row: Option<ImageRow> = sqlx::query_as(include_str!("../queries/update_image.sql"))
            .bind(update.folder_id.as_ref().map(FolderId::as_str))
            .bind(update.is_favorite)
            .bind(update.position)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| match (ErrorKind::query(e), folder_id) {
                (err, Some(folder)) if matches!(&*err, ErrorKind::Constraint) => {
                    err.raise(ErrorKind::FolderNotFound(folder.to_string()))
                },
                (err, _) => err,
            })?;
        row.ok_or_raise(|| ErrorKind::ImageNotFound(id.to_string()))?.try_into()
    }

    async fn set_positions(&self, positions: &[(ImageId, i64)]) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for (id, position) in positions {
            let result = sqlx::query(include_str!("../queries/set_image_position.sql"))
                .bind(position)
                .bind(id.as_str())
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            // Returning early drops the transaction, which rolls it back.
            if result.rows_affected() == 0 {
                exn::bail!(ErrorKind::ImageNotFound(id.to_string()));
            }
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        tracing::debug!(images = positions.len(), "set image positions");
        Ok(())
    }

    async fn delete_image(&self, id: &ImageId) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let deleted: Option<(String, Option<i64>)> = sqlx::query_as(include_str!("../queries/delete_image.sql"))
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let (user_id, size) = deleted.ok_or_raise(|| ErrorKind::ImageNotFound(id.to_string()))?;
        if let Some(size) = size.filter(|s| *s > 0) {
            sqlx::query(include_str!("../queries/subtract_storage_used.sql"))
                .bind(size)
                .bind(&user_id)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        tracing::debug!(image = %id, "deleted image");
        Ok(())
    }

    // =========================================================================
    // Usage
    // =========================================================================

    async fn storage_usage(&self, user: &UserId) -> Result<StorageUsage> {
        let row: Option<UsageRow> = sqlx::query_as(include_str!("../queries/get_storage_usage.sql"))
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.ok_or_raise(|| ErrorKind::ProfileNotFound(user.to_string()))?.try_into()
    }
}
