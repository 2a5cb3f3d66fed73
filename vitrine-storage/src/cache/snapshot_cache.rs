//! Snapshot tier: a [`SnapshotBackend`] plus hit/miss accounting.
//!
//! Backend failures never surface to readers. A failed read is counted as a
//! miss so the loader falls through to the next tier; a failed write or
//! invalidation is logged.

use std::sync::RwLock;

use chrono::Utc;
use vitrine_core::{AssetSnapshot, NodeId, NodeKind};

use super::key::CacheKey;
use super::traits::{CacheStats, SnapshotBackend};

/// One snapshot tier (asset or leaf).
pub struct SnapshotCache {
    tier: &'static str,
    backend: Box<dyn SnapshotBackend>,
    stats: RwLock<CacheStats>,
}

impl std::fmt::Debug for SnapshotCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCache")
            .field("tier", &self.tier)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl SnapshotCache {
    pub fn new(tier: &'static str, backend: Box<dyn SnapshotBackend>) -> Self {
        Self {
            tier,
            backend,
            stats: RwLock::new(CacheStats::default()),
        }
    }

    pub fn tier(&self) -> &'static str {
        self.tier
    }

    /// Get the snapshot of `id`, if this tier holds one of `kind`.
    pub fn get(&self, kind: NodeKind, id: NodeId) -> Option<AssetSnapshot> {
        match self.backend.get(&CacheKey::new(kind, id)) {
            Ok(Some((snapshot, cached_at))) => {
                self.record(|s| s.hits += 1);
                tracing::trace!(
                    tier = self.tier,
                    id = id.get(),
                    age_ms = (Utc::now() - cached_at).num_milliseconds(),
                    "snapshot hit"
                );
                Some(snapshot)
            }
            Ok(None) => {
                self.record(|s| s.misses += 1);
                None
            }
            Err(e) => {
                self.record(|s| s.misses += 1);
                tracing::warn!(tier = self.tier, id = id.get(), error = %e, "snapshot read failed");
                None
            }
        }
    }

    /// Store a snapshot under its own id and kind.
    pub fn put(&self, snapshot: &AssetSnapshot) {
        let key = CacheKey::new(snapshot.kind(), snapshot.id());
        if let Err(e) = self.backend.put(&key, snapshot, Utc::now()) {
            tracing::warn!(tier = self.tier, id = snapshot.id().get(), error = %e, "snapshot write failed");
            return;
        }
        self.refresh_entry_count();
    }

    /// Remove the snapshot of `id`. Returns whether one was present.
    pub fn invalidate(&self, kind: NodeKind, id: NodeId) -> bool {
        match self.backend.delete(&CacheKey::new(kind, id)) {
            Ok(removed) => {
                if removed {
                    self.record(|s| {
                        s.invalidations += 1;
                        s.entry_count = s.entry_count.saturating_sub(1);
                    });
                }
                removed
            }
            Err(e) => {
                tracing::error!(tier = self.tier, id = id.get(), error = %e, "snapshot invalidation failed");
                false
            }
        }
    }

    /// Remove the snapshots of every id in `ids`. Returns how many were present.
    pub fn invalidate_many(&self, kind: NodeKind, ids: &[NodeId]) -> u64 {
        ids.iter().filter(|id| self.invalidate(kind, **id)).count() as u64
    }

    /// Remove every snapshot this tier holds.
    pub fn clear(&self) -> u64 {
        let mut removed = 0;
        for kind in [NodeKind::Container, NodeKind::Leaf] {
            match self.backend.invalidate_kind(kind) {
                Ok(count) => removed += count,
                Err(e) => {
                    tracing::error!(tier = self.tier, kind = %kind, error = %e, "snapshot clear failed")
                }
            }
        }
        self.record(|s| {
            s.invalidations += removed;
            s.entry_count = 0;
        });
        removed
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }

    fn refresh_entry_count(&self) {
        if let Ok(count) = self.backend.len() {
            self.record(|s| s.entry_count = count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory_backend::MemorySnapshotBackend;
    use crate::cache::test_support::{make_test_container, make_test_leaf};

    fn make_cache() -> SnapshotCache {
        SnapshotCache::new("asset", Box::new(MemorySnapshotBackend::new()))
    }

    #[test]
    fn test_hit_and_miss_are_counted() {
        let cache = make_cache();
        let id = NodeId::new(1);
        assert!(cache.get(NodeKind::Container, id).is_none());

        cache.put(&make_test_container(id, None));
        assert!(cache.get(NodeKind::Container, id).is_some());
        assert!(cache.get(NodeKind::Container, id).is_some());
        // Same id under the other kind is a different entry.
        assert!(cache.get(NodeKind::Leaf, id).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.entry_count, 1);
    }

    #[test]
    fn test_invalidate_many() {
        let cache = make_cache();
        let parent = NodeId::new(1);
        for raw in 2..=4 {
            cache.put(&make_test_leaf(NodeId::new(raw), parent));
        }

        let removed = cache.invalidate_many(
            NodeKind::Leaf,
            &[NodeId::new(2), NodeId::new(3), NodeId::new(99)],
        );
        assert_eq!(removed, 2);
        assert!(cache.get(NodeKind::Leaf, NodeId::new(4)).is_some());
        assert_eq!(cache.stats().entry_count, 1);
        assert_eq!(cache.stats().invalidations, 2);
    }

    #[test]
    fn test_clear() {
        let cache = make_cache();
        cache.put(&make_test_container(NodeId::new(1), None));
        cache.put(&make_test_leaf(NodeId::new(2), NodeId::new(1)));
        assert_eq!(cache.clear(), 2);
        assert!(cache.get(NodeKind::Container, NodeId::new(1)).is_none());
        assert_eq!(cache.stats().entry_count, 0);
    }
}
