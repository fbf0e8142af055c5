//! The record store contract.

use crate::error::Result;
use crate::models::{
    FolderId, FolderRecord, FolderUpdate, ImageId, ImageRecord, ImageUpdate, NewFolder, NewImage, StorageUsage, UserId,
};
use async_trait::async_trait;
use std::sync::Arc;

pub type StoreHandle = Arc<dyn RecordStore + Send + Sync>;

/// Authenticated CRUD over folders, images and account storage usage.
///
/// Implementations assign identifiers and creation times. Missing rows are
/// reported as [`FolderNotFound`](crate::error::ErrorKind::FolderNotFound) /
/// [`ImageNotFound`](crate::error::ErrorKind::ImageNotFound), and deleting a
/// folder that images still reference fails with
/// [`Constraint`](crate::error::ErrorKind::Constraint).
///
/// # Storage accounting
///
/// Creating an image adds its `file_size_bytes` to the owner's used bytes;
/// deleting it subtracts them again (never going below zero).
///
/// # Examples
///
/// ```
/// use memefold_records::{RecordStore, NewFolder, UserId, error::Result};
///
/// async fn first_folder(store: &dyn RecordStore, user: &UserId) -> Result<String> {
///     let folder = store
///         .create_folder(NewFolder { user_id: user.clone(), name: "Dank".into(), color: "#a855f7".into() })
///         .await?;
///     Ok(folder.id.to_string())
/// }
/// ```
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All folders owned by `user`, oldest first.
    async fn list_folders(&self, user: &UserId) -> Result<Vec<FolderRecord>>;

    async fn create_folder(&self, folder: NewFolder) -> Result<FolderRecord>;

    async fn update_folder(&self, id: &FolderId, update: FolderUpdate) -> Result<FolderRecord>;

    /// Delete a folder. Its images must already be gone.
    async fn delete_folder(&self, id: &FolderId) -> Result<()>;

    /// All images owned by `user`, grouped by folder and sorted by position.
    async fn list_images(&self, user: &UserId) -> Result<Vec<ImageRecord>>;

    async fn create_image(&self, image: NewImage) -> Result<ImageRecord>;

    async fn update_image(&self, id: &ImageId, update: ImageUpdate) -> Result<ImageRecord>;

    /// Write the positions of several images. Either every position is
    /// written or, on any error, none is.
    async fn set_positions(&self, positions: &[(ImageId, i64)]) -> Result<()>;

    async fn delete_image(&self, id: &ImageId) -> Result<()>;

    /// Current usage and limit of the account.
    ///
    /// Returns [`ProfileNotFound`](crate::error::ErrorKind::ProfileNotFound)
    /// if the account has no profile.
    async fn storage_usage(&self, user: &UserId) -> Result<StorageUsage>;
}
