//! Folder, image and account records.
//!
//! This crate is the metadata half of the remote store: which folders a user
//! has, which images live in them, and how many bytes the account has used.
//! Image bytes themselves live in `memefold-storage`.
//!
//! # Architecture
//! - [`RecordStore`] is the contract the rest of the workspace codes against.
//! - [`Repository`] implements it on top of SQLite ([`Database`]).
//! - `MockStore` (feature `mock`) implements it in memory, with call counting
//!   and failure injection for tests.

mod db;
pub mod error;
#[cfg(feature = "mock")]
mod mock;
pub mod models;
mod repo;
mod store;

pub use crate::db::Database;
#[cfg(feature = "mock")]
pub use crate::mock::{MockStore, Operation};
pub use crate::models::{
    FolderId, FolderRecord, FolderUpdate, ImageId, ImageRecord, ImageUpdate, NewFolder, NewImage, StorageUsage, UserId,
};
pub use crate::repo::Repository;
pub use crate::store::{RecordStore, StoreHandle};
