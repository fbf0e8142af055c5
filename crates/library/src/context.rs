use memefold_records::StoreHandle;
use memefold_storage::BackendHandle;
use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

/// Handles to the remote store plus the limits every operation is checked
/// against. Cheap to clone.
#[derive(Clone)]
pub struct Context {
    pub records: StoreHandle,
    pub storage: BackendHandle,
    pub limits: Limits,
}
impl Context {
    pub fn new(records: StoreHandle, storage: BackendHandle, limits: Limits) -> Self {
        Self { records, storage, limits }
    }
}

/// How folder names are compared when checking for duplicates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NameMatching {
    #[default]
    Exact,
    CaseInsensitive,
}
impl NameMatching {
    pub fn matches(self, a: &str, b: &str) -> bool {
        match self {
            Self::Exact => a == b,
            Self::CaseInsensitive => a.to_lowercase() == b.to_lowercase(),
        }
    }
}

/// Per-account limits. Deserializes with every missing field taken from
/// [`Limits::default`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Folders per account, not counting Favorites.
    pub folder_limit: usize,
    /// Images per folder; `None` for no limit.
    pub max_images_per_folder: Option<usize>,
    /// Largest single file that may be uploaded, in bytes.
    pub max_file_size: u64,
    /// Storage limit in bytes for accounts that have none set.
    pub free_tier_bytes: u64,
    /// Bytes.
    pub premium_tier_bytes: u64,
    pub name_matching: NameMatching,
}
impl Default for Limits {
    fn default() -> Self {
        Self {
            folder_limit: 5,
            max_images_per_folder: Some(10),
            max_file_size: 10 * MIB,
            free_tier_bytes: 100 * MIB,
            premium_tier_bytes: 1024 * MIB,
            name_matching: NameMatching::Exact,
        }
    }
}
impl Limits {
    /// The storage limit that applies to an account, given the limit stored
    /// on its profile (if any).
    pub fn storage_limit(&self, account_limit: Option<u64>) -> u64 {
        account_limit.unwrap_or(self.free_tier_bytes)
    }
}
