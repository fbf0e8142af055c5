//! In-memory record store for testing.

use crate::error::{ErrorKind, Result};
use crate::models::{
    FolderId, FolderRecord, FolderUpdate, ImageId, ImageRecord, ImageUpdate, NewFolder, NewImage, StorageUsage, UserId,
};
use crate::store::RecordStore;
use async_trait::async_trait;
use exn::OptionExt;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use time::UtcDateTime;
use tokio::sync::RwLock;

/// Store operations that [`MockStore`] counts and can be told to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    ListFolders,
    CreateFolder,
    UpdateFolder,
    DeleteFolder,
    ListImages,
    CreateImage,
    UpdateImage,
    SetPositions,
    DeleteImage,
    StorageUsage,
}

#[derive(Clone, Copy, Debug)]
enum Failure {
    /// Only the n-th call (1-based) fails.
    Nth(usize),
    Always,
}

#[derive(Default)]
struct Calls {
    counts: HashMap<Operation, usize>,
    failures: HashMap<Operation, Failure>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    folders: Vec<FolderRecord>,
    images: Vec<ImageRecord>,
    profiles: HashMap<UserId, StorageUsage>,
}
impl State {
    fn id(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{kind}-{}", self.next_id)
    }
}

/// In-memory record store for testing.
///
/// Behaves like [`Repository`](crate::Repository): folders with images can't
/// be deleted, and image writes keep the account's usage counter in step.
/// Ids are sequential (`folder-1`, `image-2`, ...) so tests can predict them.
/// Injected failures surface as
/// [`Unavailable`](crate::error::ErrorKind::Unavailable) and leave the state
/// untouched.
///
/// # Examples
///
/// ```
/// use memefold_records::{MockStore, NewFolder, Operation, RecordStore, UserId};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MockStore::default().fail_on(Operation::CreateFolder, 2);
/// let user = UserId::from("user-1");
/// let new = || NewFolder { user_id: user.clone(), name: "Dank".into(), color: "#a855f7".into() };
/// assert!(store.create_folder(new()).await.is_ok());
/// assert!(store.create_folder(new()).await.is_err());
/// assert_eq!(store.calls(Operation::CreateFolder), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct MockStore {
    state: RwLock<State>,
    calls: Mutex<Calls>,
}

impl MockStore {
    /// Add a profile with the given counters.
    pub fn with_profile(mut self, user: impl Into<UserId>, used_bytes: u64, limit_bytes: Option<u64>) -> Self {
        self.state.get_mut().profiles.insert(user.into(), StorageUsage { used_bytes, limit_bytes });
        self
    }

    /// Make the `nth` call (1-based, counting from store creation) of an
    /// operation fail. Other calls succeed.
    pub fn fail_on(self, operation: Operation, nth: usize) -> Self {
        self.lock_calls().failures.insert(operation, Failure::Nth(nth));
        self
    }

    /// Make every call of an operation fail.
    pub fn fail_always(self, operation: Operation) -> Self {
        self.lock_calls().failures.insert(operation, Failure::Always);
        self
    }

    /// Stop failing an operation, e.g. to let a test "reconnect".
    pub fn recover(&self, operation: Operation) {
        self.lock_calls().failures.remove(&operation);
    }

    /// Number of times an operation has been called, including failed calls.
    pub fn calls(&self, operation: Operation) -> usize {
        self.lock_calls().counts.get(&operation).copied().unwrap_or_default()
    }

    /// Every stored image, without counting as a call.
    pub async fn images(&self) -> Vec<ImageRecord> {
        self.state.read().await.images.clone()
    }

    /// Every stored folder, without counting as a call.
    pub async fn folders(&self) -> Vec<FolderRecord> {
        self.state.read().await.folders.clone()
    }

    fn lock_calls(&self) -> MutexGuard<'_, Calls> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, operation: Operation) -> Result<()> {
        let mut calls = self.lock_calls();
        let count = calls.counts.entry(operation).or_default();
        *count += 1;
        let count = *count;
        match calls.failures.get(&operation) {
            Some(Failure::Always) => exn::bail!(ErrorKind::Unavailable(format!("injected {operation:?} failure"))),
            Some(Failure::Nth(n)) if *n == count => {
                exn::bail!(ErrorKind::Unavailable(format!("injected {operation:?} failure on call {count}")))
            },
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RecordStore for MockStore {
    async fn list_folders(&self, user: &UserId) -> Result<Vec<FolderRecord>> {
        self.record(Operation::ListFolders)?;
        let state = self.state.read().await;
        Ok(state.folders.iter().filter(|f| &f.user_id == user).cloned().collect())
    }

    async fn create_folder(&self, folder: NewFolder) -> Result<FolderRecord> {
        self.record(Operation::CreateFolder)?;
        let mut state = self.state.write().await;
        let record = FolderRecord {
            id: state.id("folder").into(),
            user_id: folder.user_id,
            name: folder.name,
            color: folder.color,
            is_public: false,
            created_at: UtcDateTime::now(),
        };
        state.folders.push(record.clone());
        Ok(record)
    }

    async fn update_folder(&self, id: &FolderId, update: FolderUpdate) -> Result<FolderRecord> {
        self.record(Operation::UpdateFolder)?;
        let mut state = self.state.write().await;
        let folder = state
            .folders
            .iter_mut()
            .find(|f| &f.id == id)
            .ok_or_raise(|| ErrorKind::FolderNotFound(id.to_string()))?;
        if let Some(name) = update.name {
            folder.name = name;
        }
        if let Some(color) = update.color {
            folder.color = color;
        }
        if let Some(is_public) = update.is_public {
            folder.is_public = is_public;
        }
        Ok(folder.clone())
    }

    async fn delete_folder(&self, id: &FolderId) -> Result<()> {
        self.record(Operation::DeleteFolder)?;
        let mut state = self.state.write().await;
        let index = state
            .folders
            .iter()
            .position(|f| &f.id == id)
            .ok_or_raise(|| ErrorKind::FolderNotFound(id.to_string()))?;
        if state.images.iter().any(|i| &i.folder_id == id) {
            exn::bail!(ErrorKind::Constraint);
        }
        state.folders.remove(index);
        Ok(())
    }

    async fn list_images(&self, user: &UserId) -> Result<Vec<ImageRecord>> {
        self.record(Operation::ListImages)?;
        let state = self.state.read().await;
        let mut images: Vec<_> = state.images.iter().filter(|i| &i.user_id == user).cloned().collect();
        // Stable: insertion order breaks ties.
        images.sort_by(|a, b| (&a.folder_id, a.position, a.created_at).cmp(&(&b.folder_id, b.position, b.created_at)));
        Ok(images)
    }

    async fn create_image(&self, image: NewImage) -> Result<ImageRecord> {
        self.record(Operation::CreateImage)?;
        let mut state = self.state.write().await;
        if !state.folders.iter().any(|f| f.id == image.folder_id) {
            exn::bail!(ErrorKind::FolderNotFound(image.folder_id.to_string()));
        }
        let record = ImageRecord {
            id: state.id("image").into(),
            user_id: image.user_id,
            folder_id: image.folder_id,
            url: image.url,
            is_favorite: image.is_favorite,
            position: image.position,
            file_size_bytes: image.file_size_bytes,
            storage_path: image.storage_path,
            created_at: UtcDateTime::now(),
        };
        if let Some(size) = record.file_size_bytes.filter(|s| *s > 0) {
            let usage = state
                .profiles
                .entry(record.user_id.clone())
                .or_insert(StorageUsage { used_bytes: 0, limit_bytes: None });
            usage.used_bytes = usage.used_bytes.saturating_add(size);
        }
        state.images.push(record.clone());
        Ok(record)
    }

    async fn update_image(&self, id: &ImageId, update: ImageUpdate) -> Result<ImageRecord> {
        self.record(Operation::UpdateImage)?;
        let mut state = self.state.write().await;
        if let Some(folder_id) = &update.folder_id
            && !state.folders.iter().any(|f| &f.id == folder_id)
        {
            exn::bail!(ErrorKind::FolderNotFound(folder_id.to_string()));
        }
        let image = state
            .images
            .iter_mut()
            .find(|i| &i.id == id)
            .ok_or_raise(|| ErrorKind::ImageNotFound(id.to_string()))?;
        if let Some(folder_id) = update.folder_id {
            image.folder_id = folder_id;
        }
        if let Some(is_favorite) = update.is_favorite {
            image.is_favorite = is_favorite;
        }
        if let Some(position) = update.position {
            image.position = position;
        }
        Ok(image.clone())
    }

    async fn set_positions(&self, positions: &[(ImageId, i64)]) -> Result<()> {
        self.record(Operation::SetPositions)?;
        let mut state = self.state.write().await;
        if let Some((missing, _)) = positions.iter().find(|(id, _)| !state.images.iter().any(|i| &i.id == id)) {
            exn::bail!(ErrorKind::ImageNotFound(missing.to_string()));
        }
        for image in &mut state.images {
            if let Some((_, position)) = positions.iter().find(|(id, _)| id == &image.id) {
                image.position = *position;
            }
        }
        Ok(())
    }

    async fn delete_image(&self, id: &ImageId) -> Result<()> {
        self.record(Operation::DeleteImage)?;
        let mut state = self.state.write().await;
        let index = state
            .images
            .iter()
            .position(|i| &i.id == id)
            .ok_or_raise(|| ErrorKind::ImageNotFound(id.to_string()))?;
        let image = state.images.remove(index);
        if let Some(size) = image.file_size_bytes
            && let Some(usage) = state.profiles.get_mut(&image.user_id)
        {
            usage.used_bytes = usage.used_bytes.saturating_sub(size);
        }
        Ok(())
    }

    async fn storage_usage(&self, user: &UserId) -> Result<StorageUsage> {
        self.record(Operation::StorageUsage)?;
        let state = self.state.read().await;
        state.profiles.get(user).copied().ok_or_raise(|| ErrorKind::ProfileNotFound(user.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_folder(user: &str, name: &str) -> NewFolder {
        NewFolder { user_id: user.into(), name: name.into(), color: "#a855f7".into() }
    }

    fn new_image(user: &str, folder: &FolderId, position: i64, size: Option<u64>) -> NewImage {
        NewImage {
            user_id: user.into(),
            folder_id: folder.clone(),
            url: format!("https://cdn.example.com/{user}/{position}.png"),
            is_favorite: false,
            position,
            file_size_bytes: size,
            storage_path: None,
        }
    }

    #[tokio::test]
    async fn test_sequential_ids() {
        let store = MockStore::default();
        let folder = store.create_folder(new_folder("u", "A")).await.unwrap();
        let image = store.create_image(new_image("u", &folder.id, 0, None)).await.unwrap();
        assert_eq!(folder.id.as_str(), "folder-1");
        assert_eq!(image.id.as_str(), "image-2");
    }

    #[tokio::test]
    async fn test_lists_are_per_user() {
        let store = MockStore::default();
        store.create_folder(new_folder("u", "A")).await.unwrap();
        store.create_folder(new_folder("other", "B")).await.unwrap();
        let folders = store.list_folders(&UserId::from("u")).await.unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].name, "A");
    }

    #[tokio::test]
    async fn test_images_sorted_by_position() {
        let store = MockStore::default();
        let folder = store.create_folder(new_folder("u", "A")).await.unwrap();
        let second = store.create_image(new_image("u", &folder.id, 1, None)).await.unwrap();
        let first = store.create_image(new_image("u", &folder.id, 0, None)).await.unwrap();
        let ids: Vec<_> = store.list_images(&UserId::from("u")).await.unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn test_folder_with_images_cannot_be_deleted() {
        let store = MockStore::default();
        let folder = store.create_folder(new_folder("u", "A")).await.unwrap();
        let image = store.create_image(new_image("u", &folder.id, 0, None)).await.unwrap();
        let err = store.delete_folder(&folder.id).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Constraint));
        store.delete_image(&image.id).await.unwrap();
        store.delete_folder(&folder.id).await.unwrap();
        assert!(store.folders().await.is_empty());
    }

    #[tokio::test]
    async fn test_storage_accounting() {
        let store = MockStore::default().with_profile("u", 100, Some(1_000));
        let folder = store.create_folder(new_folder("u", "A")).await.unwrap();
        let image = store.create_image(new_image("u", &folder.id, 0, Some(400))).await.unwrap();
        let usage = store.storage_usage(&UserId::from("u")).await.unwrap();
        assert_eq!(usage, StorageUsage { used_bytes: 500, limit_bytes: Some(1_000) });
        store.delete_image(&image.id).await.unwrap();
        assert_eq!(store.storage_usage(&UserId::from("u")).await.unwrap().used_bytes, 100);
    }

    #[tokio::test]
    async fn test_missing_profile() {
        let store = MockStore::default();
        let err = store.storage_usage(&UserId::from("nobody")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ProfileNotFound(_)));
    }

    #[tokio::test]
    async fn test_injected_failure_leaves_state_untouched() {
        let store = MockStore::default().fail_always(Operation::CreateFolder);
        let err = store.create_folder(new_folder("u", "A")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Unavailable(_)));
        assert!(err.is_retryable());
        assert!(store.folders().await.is_empty());
        store.recover(Operation::CreateFolder);
        assert!(store.create_folder(new_folder("u", "A")).await.is_ok());
        assert_eq!(store.calls(Operation::CreateFolder), 2);
    }

    #[tokio::test]
    async fn test_set_positions_is_all_or_nothing() {
        let store = MockStore::default();
        let folder = store.create_folder(new_folder("u", "A")).await.unwrap();
        let a = store.create_image(new_image("u", &folder.id, 0, None)).await.unwrap();
        let b = store.create_image(new_image("u", &folder.id, 1, None)).await.unwrap();

        let err = store.set_positions(&[(b.id.clone(), 0), ("missing".into(), 1)]).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ImageNotFound(_)));
        let positions: Vec<_> = store.images().await.iter().map(|i| i.position).collect();
        assert_eq!(positions, vec![0, 1]);

        store.set_positions(&[(b.id.clone(), 0), (a.id.clone(), 1)]).await.unwrap();
        let ids: Vec<_> = store.list_images(&UserId::from("u")).await.unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[tokio::test]
    async fn test_update_image_into_missing_folder() {
        let store = MockStore::default();
        let folder = store.create_folder(new_folder("u", "A")).await.unwrap();
        let image = store.create_image(new_image("u", &folder.id, 0, None)).await.unwrap();
        let err = store.update_image(&image.id, ImageUpdate::move_to("nope".into(), 0)).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::FolderNotFound(_)));
        assert_eq!(store.images().await[0].folder_id, folder.id);
    }
}
