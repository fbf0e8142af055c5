//! In-memory storage backend for testing.

use super::{ObjectInfoStream, join_url};
use crate::error::{ErrorKind, Result};
use crate::path::{to_key, validate as validate_path};
use crate::{ContentType, ObjectInfo, StorageBackend, WriteMode};
use async_stream::stream;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// Backend operations that [`MockBackend`] counts and can be told to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Upload,
    PublicUrl,
    Delete,
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

/// In-memory storage backend for testing.
///
/// Objects are stored in a `HashMap` behind a [`RwLock`], so all trait methods
/// can operate on `&self` without external synchronisation. Every call is
/// counted per [`Operation`], and any operation can be made to fail, which is
/// how callers prove that a rejected upload never reached storage.
///
/// # Examples
///
/// ```
/// use memefold_storage::backend::{MockBackend, Operation, StorageBackend};
/// use memefold_storage::{ContentType, WriteMode};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("user-1/old.png", b"...")]);
/// assert_eq!(backend.contents("user-1/old.png").await.as_deref(), Some(&b"..."[..]));
///
/// backend.upload(Path::new("user-1/new.png"), b"...", ContentType::Png, WriteMode::CreateNew).await?;
/// assert_eq!(backend.calls(Operation::Upload), 1);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    name: String,
    public_url: String,
    storage: RwLock<HashMap<PathBuf, (OffsetDateTime, Vec<u8>)>>,
    calls: Mutex<Calls>,
}

impl MockBackend {
    /// Create a mock backend pre-populated with objects.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        let now = OffsetDateTime::now_utc();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                // The panic here is DELIBERATE. MockBackend is intended to be
                // used in tests; panics are expected. There is no error result.
                panic!("MockBackend::with_files: invalid path {}", path.display());
            };
            map.insert(validated, (now, data.into()));
        }
        Self {
            name: "mock".to_string(),
            public_url: "https://storage.mock.invalid/user-images".to_string(),
            storage: RwLock::new(map),
            calls: Mutex::new(Calls::default()),
        }
    }

    /// Change the name of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Make the `nth` call (1-based, counting from backend creation) of an
    /// operation fail with a network error. Other calls succeed.
    pub fn fail_on(self, operation: Operation, nth: usize) -> Self {
        self.lock_calls().failures.insert(operation, Failure::Nth(nth));
        self
    }

    /// Make every call of an operation fail with a network error.
    pub fn fail_always(self, operation: Operation) -> Self {
        self.lock_calls().failures.insert(operation, Failure::Always);
        self
    }

    /// Number of times an operation has been called, including failed calls.
    pub fn calls(&self, operation: Operation) -> usize {
        self.lock_calls().counts.get(&operation).copied().unwrap_or_default()
    }

    /// Paths of every object currently stored.
    pub async fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.storage.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Stored bytes of an object, without counting as a backend call.
    pub async fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let path = validate_path(path).ok()?;
        self.storage.read().await.get(&path).map(|(_, data)| data.clone())
    }

    /// Backdate an object, for tests that care about object age.
    pub async fn set_modified(&self, path: impl AsRef<Path>, modified: OffsetDateTime) {
        if let Ok(path) = validate_path(path)
            && let Some(entry) = self.storage.write().await.get_mut(&path)
        {
            entry.0 = modified;
        }
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
            Some(Failure::Always) => exn::bail!(ErrorKind::Network(format!("injected {operation:?} failure"))),
            Some(Failure::Nth(n)) if *n == count => {
                exn::bail!(ErrorKind::Network(format!("injected {operation:?} failure on call {count}")))
            },
            _ => Ok(()),
        }
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> ObjectInfoStream<'a> {
        if let Err(e) = self.record(Operation::List) {
            return Box::pin(futures::stream::once(async { Err(e) }));
        }
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            // Snapshot matching entries under the read lock, then drop it
            // before yielding to avoid holding the lock across yield points.
            let entries: Vec<(PathBuf, OffsetDateTime, u64)> = {
                let guard = self.storage.read().await;
                guard
                    .iter()
                    .filter(|(path, _)| match &validated_prefix {
                        Some(pfx) => path.starts_with(pfx),
                        None => true,
                    })
                    .map(|(path, (modified, data))| (path.clone(), *modified, data.len() as u64))
                    .collect()
            };
            for (path, modified, size) in entries {
                yield Ok(ObjectInfo::new(path, size, modified));
            }
        })
    }

    async fn upload(&self, path: &Path, data: &[u8], _content_type: ContentType, mode: WriteMode) -> Result<()> {
        self.record(Operation::Upload)?;
        let path = validate_path(path)?;
        let mut guard = self.storage.write().await;
        if mode == WriteMode::CreateNew && guard.contains_key(&path) {
            exn::bail!(ErrorKind::AlreadyExists(path));
        }
        guard.insert(path, (OffsetDateTime::now_utc(), data.to_vec()));
        Ok(())
    }

    async fn public_url(&self, path: &Path) -> Result<String> {
        self.record(Operation::PublicUrl)?;
        let path = validate_path(path)?;
        Ok(join_url(&self.public_url, &to_key(&path)))
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        self.record(Operation::Delete)?;
        let path = validate_path(path)?;
        self.storage.write().await.remove(&path).map(|_| ()).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }
}
