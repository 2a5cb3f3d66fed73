//! Process-local snapshot backend.

use std::collections::HashMap;
use std::sync::RwLock;

use vitrine_core::{AssetSnapshot, NodeKind, StorageError, Timestamp, VitrineError, VitrineResult};

use super::key::CacheKey;
use super::traits::SnapshotBackend;

/// [`SnapshotBackend`] over a hash map. Snapshots are stored by value and
/// cloned out on read.
#[derive(Debug, Default)]
pub struct MemorySnapshotBackend {
    entries: RwLock<HashMap<CacheKey, (AssetSnapshot, Timestamp)>>,
}

impl MemorySnapshotBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> VitrineError {
    VitrineError::Storage(StorageError::LockPoisoned)
}

impl SnapshotBackend for MemorySnapshotBackend {
    fn get(&self, key: &CacheKey) -> VitrineResult<Option<(AssetSnapshot, Timestamp)>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(
        &self,
        key: &CacheKey,
        snapshot: &AssetSnapshot,
        cached_at: Timestamp,
    ) -> VitrineResult<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(*key, (snapshot.clone(), cached_at));
        Ok(())
    }

    fn delete(&self, key: &CacheKey) -> VitrineResult<bool> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        Ok(entries.remove(key).is_some())
    }

    fn invalidate_kind(&self, kind: NodeKind) -> VitrineResult<u64> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        let before = entries.len();
        entries.retain(|key, _| key.kind() != kind);
        Ok((before - entries.len()) as u64)
    }

    fn len(&self) -> VitrineResult<u64> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.len() as u64)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_support::{make_test_container, make_test_leaf};
    use chrono::Utc;
    use vitrine_core::NodeId;

    #[test]
    fn test_put_get_delete() {
        let backend = MemorySnapshotBackend::new();
        let snapshot = make_test_container(NodeId::new(1), None);
        let key = CacheKey::container(NodeId::new(1));

        assert!(backend.get(&key).unwrap().is_none());
        backend.put(&key, &snapshot, Utc::now()).unwrap();
        assert_eq!(backend.get(&key).unwrap().map(|(s, _)| s), Some(snapshot));

        assert!(backend.delete(&key).unwrap());
        assert!(!backend.delete(&key).unwrap());
    }

    #[test]
    fn test_invalidate_kind_keeps_other_kind() {
        let backend = MemorySnapshotBackend::new();
        for raw in 1..=3 {
            let id = NodeId::new(raw);
            backend
                .put(&CacheKey::container(id), &make_test_container(id, None), Utc::now())
                .unwrap();
        }
        let leaf_id = NodeId::new(10);
        backend
            .put(&CacheKey::leaf(leaf_id), &make_test_leaf(leaf_id, NodeId::new(1)), Utc::now())
            .unwrap();

        assert_eq!(backend.invalidate_kind(NodeKind::Container).unwrap(), 3);
        assert_eq!(backend.len().unwrap(), 1);
        assert!(backend.get(&CacheKey::leaf(leaf_id)).unwrap().is_some());
    }
}
