use memefold_records::FolderId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async lock per folder id, created on first use.
#[derive(Default)]
pub(crate) struct FolderLocks {
    locks: Mutex<HashMap<FolderId, Arc<Mutex<()>>>>,
}

pub(crate) struct PairGuard {
    _first: OwnedMutexGuard<()>,
    _second: Option<OwnedMutexGuard<()>>,
}

impl FolderLocks {
    async fn handle(&self, id: &FolderId) -> Arc<Mutex<()>> {
        self.locks.lock().await.entry(id.clone()).or_default().clone()
    }

    pub(crate) async fn lock(&self, id: &FolderId) -> OwnedMutexGuard<()> {
        self.handle(id).await.lock_owned().await
    }

    /// Lock two folders, always in id order.
    pub(crate) async fn lock_pair(&self, a: &FolderId, b: &FolderId) -> PairGuard {
        if a == b {
            return PairGuard { _first: self.lock(a).await, _second: None };
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        let first = self.lock(low).await;
        let second = self.lock(high).await;
        PairGuard { _first: first, _second: Some(second) }
    }

    /// Drop the lock for a folder that no longer exists. Holders of the old
    /// lock keep it until they finish.
    pub(crate) async fn forget(&self, id: &FolderId) {
        self.locks.lock().await.remove(id);
    }

    pub(crate) async fn clear(&self) {
        self.locks.lock().await.clear();
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_folder_is_exclusive() {
        let locks = FolderLocks::default();
        let id = FolderId::from("a");
        let guard = locks.lock(&id).await;
        let pending = tokio::time::timeout(Duration::from_millis(20), locks.lock(&id)).await;
        assert!(pending.is_err());
        drop(guard);
        assert!(tokio::time::timeout(Duration::from_millis(20), locks.lock(&id)).await.is_ok());
    }

    #[tokio::test]
    async fn test_different_folders_are_independent() {
        let locks = FolderLocks::default();
        let _a = locks.lock(&"a".into()).await;
        assert!(tokio::time::timeout(Duration::from_millis(20), locks.lock(&"b".into())).await.is_ok());
    }

    #[tokio::test]
    async fn test_forget_drops_the_entry() {
        let locks = FolderLocks::default();
        let id = FolderId::from("a");
        drop(locks.lock(&id).await);
        assert_eq!(locks.len().await, 1);
        locks.forget(&id).await;
        assert_eq!(locks.len().await, 0);
    }

    #[tokio::test]
    async fn test_pair_of_same_folder() {
        let locks = FolderLocks::default();
        let id = FolderId::from("a");
        let _pair = locks.lock_pair(&id, &id).await;
        assert!(tokio::time::timeout(Duration::from_millis(20), locks.lock(&id)).await.is_err());
    }
}
