//! Binary object storage for uploaded images.
//!
//! Everything that stores image bytes goes through [`StorageBackend`]. Paths
//! are always relative to the backend root and validated with
//! [`validate_path`] before use.

pub mod backend;
pub mod error;
mod models;
mod path;

pub use crate::backend::StorageBackend;
pub use crate::models::{ContentType, ObjectInfo, WriteMode};
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
