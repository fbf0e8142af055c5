//! Folder and image state for the signed-in user.
//!
//! [`FolderManager`] loads a user's folders on [sign in](FolderManager::sign_in)
//! and exposes the mutations the app offers: creating, renaming and deleting
//! folders, adding, removing, reordering and moving images, and toggling
//! favorites. Readers get immutable [`Folders`] snapshots, either on demand or
//! through a [`watch`](tokio::sync::watch) channel.
//!
//! Favorites is not stored anywhere. Each snapshot derives it from the
//! `is_favorite` flags of the images in the real folders, under the
//! [`FAVORITES_ID`] sentinel.

mod locks;
mod manager;
mod state;

pub use self::manager::{DEFAULT_COLOR, FolderManager};
pub use self::state::{FAVORITES_COLOR, FAVORITES_ID, Folder, Folders, Image, is_favorites};
use derive_more::Display;

/// Lifecycle of a [`FolderManager`] session.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Status {
    #[display("unloaded")]
    Unloaded,
    #[display("loading")]
    Loading,
    #[display("loaded")]
    Loaded,
}

/// An image to add to a folder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewImage {
    /// Local file path (optionally `file://`) or an already hosted URL.
    pub source: String,
    pub is_favorite: bool,
}
impl NewImage {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into(), is_favorite: false }
    }

    pub fn favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }
}
