use super::locks::FolderLocks;
use super::state::{Folder, Folders, Image, is_favorites};
use super::{NewImage, Status};
use crate::context::Context;
use crate::error::{ErrorKind, Limit, Result};
use crate::quota::{self, Usage};
use crate::upload::upload;
use exn::{OptionExt, ResultExt};
use memefold_records::{FolderId, FolderUpdate, ImageId, ImageUpdate, NewFolder, UserId};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, watch};

/// Color of folders created without one.
pub const DEFAULT_COLOR: &str = "#a855f7";

enum Session {
    Unloaded,
    Loading { generation: u64 },
    Loaded { generation: u64, folders: Arc<Folders> },
}
impl Session {
    fn generation(&self) -> Option<u64> {
        match self {
            Self::Unloaded => None,
            Self::Loading { generation } | Self::Loaded { generation, .. } => Some(*generation),
        }
    }
}

/// Owns the folders of the signed-in user and keeps them in step with the
/// remote store.
///
/// Every mutation is confirmed by the remote store before it is applied
/// locally, and every applied change publishes a new [`Folders`] snapshot to
/// [subscribers](Self::subscribe). Mutations of the same folder are
/// serialized; mutations of different folders run concurrently.
///
/// Results of operations that outlive their session (the user signed out, or
/// signed in again) are discarded with
/// [`SessionEnded`](ErrorKind::SessionEnded).
pub struct FolderManager {
    context: Context,
    session: RwLock<Session>,
    generation: AtomicU64,
    snapshots: watch::Sender<Option<Arc<Folders>>>,
    locks: FolderLocks,
    /// Held by operations that check folder names or the folder count.
    names: Mutex<()>,
}

impl FolderManager {
    pub fn new(context: Context) -> Self {
        let (snapshots, _) = watch::channel(None);
        Self {
            context,
            session: RwLock::new(Session::Unloaded),
            generation: AtomicU64::new(0),
            snapshots,
            locks: FolderLocks::default(),
            names: Mutex::new(()),
        }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub async fn status(&self) -> Status {
        match &*self.session.read().await {
            Session::Unloaded => Status::Unloaded,
            Session::Loading { .. } => Status::Loading,
            Session::Loaded { .. } => Status::Loaded,
        }
    }

    /// Watch published snapshots. The value is `None` while nothing is loaded.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Folders>>> {
        self.snapshots.subscribe()
    }

    /// The current snapshot.
    pub async fn folders(&self) -> Result<Arc<Folders>> {
        self.current().await.map(|(_, folders)| folders)
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Load the folders and images of `user`, replacing any previous session.
    ///
    /// On failure nothing is loaded and the manager is left
    /// [`Unloaded`](Status::Unloaded).
    #[tracing::instrument(skip_all, fields(user = %user))]
    pub async fn sign_in(&self, user: UserId) -> Result<Arc<Folders>> {
        let generation = {
            let mut session = self.session.write().await;
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *session = Session::Loading { generation };
            generation
        };
        self.snapshots.send_replace(None);

        let loaded = load(&self.context, &user).await;
        let mut session = self.session.write().await;
        if session.generation() != Some(generation) {
            exn::bail!(ErrorKind::SessionEnded);
        }
        match loaded {
            Ok(folders) => {
                let folders = Arc::new(Folders::new(user, folders));
                tracing::info!(folders = folders.len(), images = folders.image_count(), "loaded folders");
                *session = Session::Loaded { generation, folders: folders.clone() };
                self.snapshots.send_replace(Some(folders.clone()));
                Ok(folders)
            },
            Err(err) => {
                *session = Session::Unloaded;
                Err(err)
            },
        }
    }

    /// Forget the current user's folders. Operations still in flight will
    /// fail with [`SessionEnded`](ErrorKind::SessionEnded).
    pub async fn sign_out(&self) {
        {
            let mut session = self.session.write().await;
            self.generation.fetch_add(1, Ordering::SeqCst);
            *session = Session::Unloaded;
            self.snapshots.send_replace(None);
        }
        self.locks.clear().await;
        tracing::info!("signed out");
    }

    async fn current(&self) -> Result<(u64, Arc<Folders>)> {
        match &*self.session.read().await {
            Session::Loaded { generation, folders } => Ok((*generation, folders.clone())),
            _ => exn::bail!(ErrorKind::NotLoaded),
        }
    }

    /// Apply a confirmed change to the folders of `generation` and publish
    /// the new snapshot.
    async fn commit<T>(&self, generation: u64, apply: impl FnOnce(&mut Vec<Folder>) -> T) -> Result<T> {
        let mut session = self.session.write().await;
        let Session::Loaded { generation: current, folders } = &mut *session else {
            exn::bail!(ErrorKind::SessionEnded);
        };
        if *current != generation {
            exn::bail!(ErrorKind::SessionEnded);
        }
        let user = folders.user().clone();
        let mut next = folders.to_vec();
        let output = apply(&mut next);
        *folders = Arc::new(Folders::new(user, next));
        self.snapshots.send_replace(Some(folders.clone()));
        Ok(output)
    }

    // =========================================================================
    // Folders
    // =========================================================================

    /// Create an empty folder and return its id.
    #[tracing::instrument(skip_all)]
    pub async fn create_folder(&self, name: &str, color: Option<&str>) -> Result<FolderId> {
        let _names = self.names.lock().await;
        let (generation, folders) = self.current().await?;
        let name = validate_name(name)?;
        let limit = self.context.limits.folder_limit;
        if folders.len() >= limit {
            exn::bail!(ErrorKind::LimitExceeded(Limit::Folders { limit }));
        }
        self.check_unique(&folders, name, None)?;

        let record = self
            .context
            .records
            .create_folder(NewFolder {
                user_id: folders.user().clone(),
                name: name.to_string(),
                color: color.unwrap_or(DEFAULT_COLOR).to_string(),
            })
            .await
            .or_raise(|| ErrorKind::Remote)?;
        let id = record.id.clone();
        tracing::info!(folder = %id, name = %record.name, "created folder");
        self.commit(generation, |folders| folders.push(Folder::from(record))).await?;
        Ok(id)
    }

    #[tracing::instrument(skip_all, fields(folder = %id))]
    pub async fn rename_folder(&self, id: &FolderId, name: &str) -> Result<()> {
        let _names = self.names.lock().await;
        let (_, folders) = self.current().await?;
        real_folder(&folders, id)?;
        let name = validate_name(name)?;
        self.check_unique(&folders, name, Some(id))?;
        self.update_folder(id, FolderUpdate::name(name)).await
    }

    pub async fn set_folder_color(&self, id: &FolderId, color: &str) -> Result<()> {
        self.update_folder(id, FolderUpdate::color(color)).await
    }

    pub async fn set_folder_public(&self, id: &FolderId, is_public: bool) -> Result<()> {
        self.update_folder(id, FolderUpdate::public(is_public)).await
    }

    async fn update_folder(&self, id: &FolderId, update: FolderUpdate) -> Result<()> {
        let (_guard, generation, _) = self.lock_folder(id).await?;
        let record = self.context.records.update_folder(id, update).await.or_raise(|| ErrorKind::Remote)?;
        tracing::debug!(folder = %id, "updated folder");
        self.commit(generation, |folders| {
            if let Some(folder) = find_mut(folders, id) {
                folder.apply(record);
            }
        })
        .await
    }

    /// Delete a folder together with its images.
    ///
    /// Image records go first, one at a time. If one can't be deleted the
    /// folder record is kept along with the images that are still stored, and
    /// the error is returned. Images whose records were deleted are dropped
    /// locally and their stored objects removed on a best-effort basis.
    #[tracing::instrument(skip_all, fields(folder = %id))]
    pub async fn delete_folder(&self, id: &FolderId) -> Result<()> {
        let (_guard, generation, folders) = self.lock_folder(id).await?;
        let folder = real_folder(&folders, id)?;

        let mut deleted = Vec::new();
        let mut failure = None;
        for image in &folder.images {
            match self.context.records.delete_image(&image.id).await {
                Ok(()) => deleted.push(image),
                Err(err) => {
                    failure = Some(err);
                    break;
                },
            }
        }
        self.remove_objects(deleted.iter().filter_map(|i| i.storage_path.as_deref())).await;
        if let Some(err) = failure {
            tracing::warn!(deleted = deleted.len(), total = folder.images.len(), "folder delete aborted");
            if !deleted.is_empty() {
                let gone: HashSet<&ImageId> = deleted.iter().map(|i| &i.id).collect();
                self.commit(generation, |folders| {
                    if let Some(folder) = find_mut(folders, id) {
                        folder.images.retain(|i| !gone.contains(&i.id));
                    }
                })
                .await?;
            }
            return Err(err.raise(ErrorKind::Remote));
        }

        self.context.records.delete_folder(id).await.or_raise(|| ErrorKind::Remote)?;
        self.commit(generation, |folders| folders.retain(|f| &f.id != id)).await?;
        self.locks.forget(id).await;
        tracing::info!(images = deleted.len(), "deleted folder");
        Ok(())
    }

    // =========================================================================
    // Images
    // =========================================================================

    /// Upload (if needed) and record a new image at the end of a folder.
    ///
    /// Nothing is recorded when the upload fails. If the upload succeeds but
    /// the record can't be created, the stored object is left behind and a
    /// warning is logged.
    #[tracing::instrument(skip_all, fields(folder = %folder_id))]
    pub async fn add_image(&self, folder_id: &FolderId, image: NewImage) -> Result<Image> {
        let (_guard, generation, folders) = self.lock_folder(folder_id).await?;
        let folder = real_folder(&folders, folder_id)?;
        if let Some(limit) = self.context.limits.max_images_per_folder
            && folder.images.len() >= limit
        {
            exn::bail!(ErrorKind::LimitExceeded(Limit::ImagesPerFolder { limit }));
        }

        let uploaded = upload(&self.context, folders.user(), &image.source).await?;
        let storage_path = uploaded.storage_path.map(|p| p.to_string_lossy().into_owned());
        let new = memefold_records::NewImage {
            user_id: folders.user().clone(),
            folder_id: folder_id.clone(),
            url: uploaded.url,
            is_favorite: image.is_favorite,
            position: folder.next_position(),
            file_size_bytes: uploaded.size,
            storage_path: storage_path.clone(),
        };
        let record = match self.context.records.create_image(new).await {
            Ok(record) => record,
            Err(err) => {
                if let Some(path) = &storage_path {
                    tracing::warn!(path = %path, "image not recorded, stored object is orphaned");
                }
                return Err(err.raise(ErrorKind::Remote));
            },
        };

        let image = Image::from(record);
        tracing::info!(image = %image.id, "added image");
        self.commit(generation, |folders| {
            if let Some(folder) = find_mut(folders, folder_id) {
                folder.images.push(image.clone());
            }
        })
        .await?;
        Ok(image)
    }

    /// Remove an image. `folder_id` may be the Favorites sentinel.
    #[tracing::instrument(skip_all, fields(folder = %folder_id, image = %image_id))]
    pub async fn remove_image(&self, folder_id: &FolderId, image_id: &ImageId) -> Result<()> {
        let home = self.home_folder(folder_id, image_id).await?;
        let (_guard, generation, folders) = self.lock_folder(&home).await?;
        let image = image_in(&folders, &home, image_id)?;

        self.context.records.delete_image(image_id).await.or_raise(|| ErrorKind::Remote)?;
        self.remove_objects(image.storage_path.as_deref()).await;
        self.commit(generation, |folders| {
            if let Some(folder) = find_mut(folders, &home) {
                folder.images.retain(|i| &i.id != image_id);
            }
        })
        .await
    }

    /// Put a folder's images in the given order and persist their positions.
    ///
    /// `order` must hold every image of the folder exactly once. The changed
    /// positions are written in one batch, so a failure leaves both the store
    /// and the local order as they were.
    #[tracing::instrument(skip_all, fields(folder = %folder_id))]
    pub async fn reorder_images(&self, folder_id: &FolderId, order: &[ImageId]) -> Result<()> {
        let (_guard, generation, folders) = self.lock_folder(folder_id).await?;
        let folder = real_folder(&folders, folder_id)?;
        let unique: HashSet<_> = order.iter().collect();
        let complete = order.len() == folder.images.len() && unique.len() == order.len();
        if !complete || order.iter().any(|id| folder.image(id).is_none()) {
            exn::bail!(ErrorKind::InvalidOrder);
        }

        let positions: HashMap<ImageId, i64> =
            order.iter().enumerate().map(|(index, id)| (id.clone(), index as i64)).collect();
        let changed: Vec<(ImageId, i64)> = order
            .iter()
            .zip(0i64..)
            .filter(|(id, position)| folder.image(id).is_some_and(|i| i.position != *position))
            .map(|(id, position)| (id.clone(), position))
            .collect();
        if !changed.is_empty() {
            self.context.records.set_positions(&changed).await.or_raise(|| ErrorKind::Remote)?;
        }
        self.commit(generation, |folders| {
            if let Some(folder) = find_mut(folders, folder_id) {
                for image in &mut folder.images {
                    if let Some(position) = positions.get(&image.id) {
                        image.position = *position;
                    }
                }
                folder.images.sort_by_key(|i| i.position);
            }
        })
        .await
    }

    /// Flip an image's favorite flag and return the new value. `folder_id`
    /// may be the Favorites sentinel.
    #[tracing::instrument(skip_all, fields(folder = %folder_id, image = %image_id))]
    pub async fn toggle_favorite(&self, folder_id: &FolderId, image_id: &ImageId) -> Result<bool> {
        let home = self.home_folder(folder_id, image_id).await?;
        let (_guard, generation, folders) = self.lock_folder(&home).await?;
        let image = image_in(&folders, &home, image_id)?;

        let record = self
            .context
            .records
            .update_image(image_id, ImageUpdate::favorite(!image.is_favorite))
            .await
            .or_raise(|| ErrorKind::Remote)?;
        let is_favorite = record.is_favorite;
        self.commit(generation, |folders| {
            if let Some(image) = find_mut(folders, &home).and_then(|f| f.images.iter_mut().find(|i| &i.id == image_id)) {
                image.is_favorite = is_favorite;
            }
        })
        .await?;
        Ok(is_favorite)
    }

    /// Move an image to the end of another folder.
    #[tracing::instrument(skip_all, fields(image = %image_id, from = %from, to = %to))]
    pub async fn move_image(&self, image_id: &ImageId, from: &FolderId, to: &FolderId) -> Result<Image> {
        if is_favorites(from) || is_favorites(to) {
            exn::bail!(ErrorKind::DerivedFolder);
        }
        {
            let (_, folders) = self.current().await?;
            real_folder(&folders, from)?;
            real_folder(&folders, to)?;
        }
        let _guard = self.locks.lock_pair(from, to).await;
        let (generation, folders) = self.current().await?;
        for id in [from, to] {
            if let Err(err) = real_folder(&folders, id) {
                self.locks.forget(id).await;
                return Err(err);
            }
        }
        let image = image_in(&folders, from, image_id)?;
        if from == to {
            return Ok(image.clone());
        }
        let target = real_folder(&folders, to)?;
        if let Some(limit) = self.context.limits.max_images_per_folder
            && target.images.len() >= limit
        {
            exn::bail!(ErrorKind::LimitExceeded(Limit::ImagesPerFolder { limit }));
        }

        let record = self
            .context
            .records
            .update_image(image_id, ImageUpdate::move_to(to.clone(), target.next_position()))
            .await
            .or_raise(|| ErrorKind::Remote)?;
        let moved = Image::from(record);
        self.commit(generation, |folders| {
            if let Some(source) = find_mut(folders, from) {
                source.images.retain(|i| &i.id != image_id);
            }
            if let Some(target) = find_mut(folders, to) {
                target.images.push(moved.clone());
            }
        })
        .await?;
        Ok(moved)
    }

    // =========================================================================
    // Account
    // =========================================================================

    /// Storage used by the signed-in account.
    pub async fn storage_usage(&self) -> Result<Usage> {
        let (_, folders) = self.current().await?;
        quota::storage_usage(self.context.records.as_ref(), &self.context.limits, folders.user()).await
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Lock a real folder of the current session and return the snapshot
    /// taken under the lock. Ids that don't name a real folder are rejected
    /// without leaving a lock behind.
    async fn lock_folder(&self, id: &FolderId) -> Result<(OwnedMutexGuard<()>, u64, Arc<Folders>)> {
        {
            let (_, folders) = self.current().await?;
            real_folder(&folders, id)?;
        }
        let guard = self.locks.lock(id).await;
        let (generation, folders) = self.current().await?;
        // Deleted while we waited for the lock.
        if let Err(err) = real_folder(&folders, id) {
            drop(guard);
            self.locks.forget(id).await;
            return Err(err);
        }
        Ok((guard, generation, folders))
    }

    #[cfg(test)]
    pub(super) async fn lock_count(&self) -> usize {
        self.locks.len().await
    }

    /// Resolve the real folder an image lives in, looking through Favorites.
    async fn home_folder(&self, folder_id: &FolderId, image_id: &ImageId) -> Result<FolderId> {
        if !is_favorites(folder_id) {
            return Ok(folder_id.clone());
        }
        let (_, folders) = self.current().await?;
        let image = folders.favorites().image(image_id).ok_or_raise(|| ErrorKind::ImageNotFound(image_id.to_string()))?;
        Ok(image.folder_id.clone())
    }

    fn check_unique(&self, folders: &Folders, name: &str, except: Option<&FolderId>) -> Result<()> {
        let matching = self.context.limits.name_matching;
        let taken = folders.iter().filter(|f| Some(&f.id) != except).any(|f| matching.matches(&f.name, name));
        if taken {
            exn::bail!(ErrorKind::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    async fn remove_objects<'a>(&self, paths: impl IntoIterator<Item = &'a str>) {
        for path in paths {
            if let Err(err) = self.context.storage.delete(Path::new(path)).await {
                tracing::warn!(path, error = %err, "could not delete stored object");
            }
        }
    }
}

fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        exn::bail!(ErrorKind::EmptyName);
    }
    Ok(name)
}

fn real_folder<'a>(folders: &'a Folders, id: &FolderId) -> Result<&'a Folder> {
    if is_favorites(id) {
        exn::bail!(ErrorKind::DerivedFolder);
    }
    folders.get(id).ok_or_raise(|| ErrorKind::FolderNotFound(id.to_string()))
}

fn image_in<'a>(folders: &'a Folders, folder_id: &FolderId, image_id: &ImageId) -> Result<&'a Image> {
    real_folder(folders, folder_id)?.image(image_id).ok_or_raise(|| ErrorKind::ImageNotFound(image_id.to_string()))
}

fn find_mut<'a>(folders: &'a mut [Folder], id: &FolderId) -> Option<&'a mut Folder> {
    folders.iter_mut().find(|f| &f.id == id)
}

/// Fetch a user's folders and images from the record store.
///
/// Images whose folder no longer exists are skipped. Each folder's images are
/// ordered by position, then creation.
#[tracing::instrument(skip_all, fields(user = %user))]
async fn load(context: &Context, user: &UserId) -> Result<Vec<Folder>> {
    let records = context.records.list_folders(user).await.or_raise(|| ErrorKind::Remote)?;
    let mut folders: Vec<Folder> = records.into_iter().map(Folder::from).collect();
    let index: HashMap<FolderId, usize> = folders.iter().enumerate().map(|(i, f)| (f.id.clone(), i)).collect();

    let mut skipped = 0usize;
    for record in context.records.list_images(user).await.or_raise(|| ErrorKind::Remote)? {
        match index.get(&record.folder_id) {
            Some(&i) => folders[i].images.push(Image::from(record)),
            None => skipped += 1,
        }
    }
    for folder in &mut folders {
        folder.images.sort_by_key(|i| (i.position, i.created_at));
    }
    if skipped > 0 {
        tracing::debug!(skipped, "skipped images without a folder");
    }
    Ok(folders)
}
