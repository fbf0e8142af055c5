//! Folder and image management for memefold.
//!
//! - [`quota`] decides whether an upload fits the account's storage.
//! - [`upload`](crate::upload()) moves local image bytes to object storage.
//! - [`FolderManager`] owns the signed-in user's folders and keeps them in
//!   step with the record store.
//! - [`find_orphans`] and [`remove_orphans`] clean up stored objects that no
//!   record refers to.

mod context;
pub mod error;
pub mod folders;
mod orphans;
pub mod quota;
mod upload;

pub use crate::context::{Context, Limits, NameMatching};
pub use crate::error::{Category, Limit, UploadFailure};
pub use crate::folders::{FAVORITES_ID, Folder, FolderManager, Folders, Image, NewImage, Status};
pub use crate::orphans::{Orphan, Removed, find_orphans, remove_orphans};
pub use crate::quota::{QuotaCheck, Usage, check_limit, format_bytes};
pub use crate::upload::{Upload, is_remote, upload};
