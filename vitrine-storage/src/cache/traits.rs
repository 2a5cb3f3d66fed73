//! Snapshot backend trait and cache statistics.

use super::key::CacheKey;
use vitrine_core::{AssetSnapshot, NodeKind, Timestamp, VitrineResult};

/// Storage for serialized [`AssetSnapshot`] values.
///
/// This trait abstracts over the in-memory map and the LMDB environment.
/// Implementations must be thread-safe; the snapshot tiers call them from
/// concurrent request threads without further locking.
pub trait SnapshotBackend: Send + Sync {
    /// Get a snapshot and when it was cached, or None if not found.
    fn get(&self, key: &CacheKey) -> VitrineResult<Option<(AssetSnapshot, Timestamp)>>;

    /// Put a snapshot, replacing any previous value under the key.
    fn put(&self, key: &CacheKey, snapshot: &AssetSnapshot, cached_at: Timestamp)
        -> VitrineResult<()>;

    /// Delete a snapshot. Returns whether an entry was removed.
    fn delete(&self, key: &CacheKey) -> VitrineResult<bool>;

    /// Delete every snapshot of one node kind. Returns the number removed.
    fn invalidate_kind(&self, kind: NodeKind) -> VitrineResult<u64>;

    /// Number of stored snapshots.
    fn len(&self) -> VitrineResult<u64>;

    /// Short backend name for log fields.
    fn name(&self) -> &'static str;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of evictions due to capacity.
    pub evictions: u64,
    /// Number of entries removed by invalidation.
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
