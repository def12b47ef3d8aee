//! In-memory implementation of SnapshotStore for testing

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::store::{SessionSnapshot, SnapshotStore};
use crate::error::StoreError;

/// Keeps the snapshot in memory and counts writes, so tests can assert that
/// ignored triggers did not touch storage.
///
/// # Example
///
/// ```
/// use chargeside_session::InMemorySnapshotStore;
///
/// let store = InMemorySnapshotStore::new();
/// assert_eq!(store.save_count(), 0);
/// ```
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshot: RwLock<Option<SessionSnapshot>>,
    saves: AtomicUsize,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing snapshot, as if written by a previous process
    pub fn with_snapshot(snapshot: SessionSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Some(snapshot)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of `save` calls so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// The current snapshot, if any
    pub fn current(&self) -> Option<SessionSnapshot> {
        self.snapshot.read().clone()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self) -> Result<Option<SessionSnapshot>, StoreError> {
        Ok(self.snapshot.read().clone())
    }

    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        *self.snapshot.write() = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.snapshot.write() = None;
        Ok(())
    }
}
