//! The engine's cache tiers, constructed once and owned by a [`Gallery`](crate::Gallery).
//!
//! | tier | holds | mutability |
//! |------|-------|------------|
//! | inflated | read-only [`Node`] handles | never holds writable nodes |
//! | asset | container snapshots (+ child ids) | immutable values |
//! | leaf | leaf snapshots | immutable values |
//! | aggregates | all galleries, roles, settings | replaced wholesale on purge |

use vitrine_core::{
    AssetSnapshot, CacheBackendKind, EngineConfig, NodeId, NodeKind, VitrineError, VitrineResult,
};
use vitrine_storage::{
    AggregateCache, CacheStats, InflatedCache, LmdbSnapshotBackend, MemorySnapshotBackend,
    SnapshotBackend, SnapshotCache,
};

use crate::node::Node;

/// Statistics of every tier at one point in time.
#[derive(Debug, Clone, Default)]
pub struct CacheReport {
    pub inflated: CacheStats,
    pub assets: CacheStats,
    pub leaves: CacheStats,
    pub aggregates: CacheStats,
}

pub struct CacheTiers {
    inflated: InflatedCache<Node>,
    assets: SnapshotCache,
    leaves: SnapshotCache,
    aggregates: AggregateCache,
}

impl std::fmt::Debug for CacheTiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheTiers")
            .field("inflated_len", &self.inflated.len())
            .field("assets", &self.assets)
            .field("leaves", &self.leaves)
            .finish()
    }
}

impl CacheTiers {
    /// In-memory tiers with the given inflated-node bound.
    pub fn in_memory(inflated_capacity: usize) -> Self {
        Self::with_backends(
            inflated_capacity,
            Box::new(MemorySnapshotBackend::new()),
            Box::new(MemorySnapshotBackend::new()),
        )
    }

    /// Tiers as described by `config`. The LMDB backend keeps each snapshot
    /// tier in its own environment below `cache_path`.
    pub fn from_config(config: &EngineConfig) -> VitrineResult<Self> {
        config.validate()?;
        match config.cache_backend {
            CacheBackendKind::Memory => Ok(Self::in_memory(config.inflated_cache_capacity)),
            CacheBackendKind::Lmdb => {
                let open = |tier: &str| -> VitrineResult<Box<dyn SnapshotBackend>> {
                    let path = config.cache_path.join(tier);
                    let backend = LmdbSnapshotBackend::new(path, config.cache_max_mb)
                        .map_err(VitrineError::from)?;
                    Ok(Box::new(backend))
                };
                Ok(Self::with_backends(
                    config.inflated_cache_capacity,
                    open("assets")?,
                    open("leaves")?,
                ))
            }
        }
    }

    pub fn with_backends(
        inflated_capacity: usize,
        assets: Box<dyn SnapshotBackend>,
        leaves: Box<dyn SnapshotBackend>,
    ) -> Self {
        Self {
            inflated: InflatedCache::new(inflated_capacity),
            assets: SnapshotCache::new("asset", assets),
            leaves: SnapshotCache::new("leaf", leaves),
            aggregates: AggregateCache::new(),
        }
    }

    // === Inflated tier ===

    pub fn get_inflated(&self, id: NodeId) -> Option<Node> {
        self.inflated.get(id)
    }

    /// Cache a read-only node. Writable nodes are refused.
    pub fn put_inflated(&self, node: &Node) -> bool {
        if node.is_writable() || !node.id().is_persisted() {
            tracing::debug!(id = %node.id(), "refusing to cache writable or unsaved node");
            return false;
        }
        self.inflated.put(node.id(), node.clone());
        true
    }

    // === Snapshot tiers ===

    pub(crate) fn tier(&self, kind: NodeKind) -> &SnapshotCache {
        match kind {
            NodeKind::Container => &self.assets,
            NodeKind::Leaf => &self.leaves,
        }
    }

    pub fn get_asset(&self, kind: NodeKind, id: NodeId) -> Option<AssetSnapshot> {
        self.tier(kind).get(kind, id)
    }

    pub fn put_asset(&self, snapshot: &AssetSnapshot) {
        self.tier(snapshot.kind()).put(snapshot);
    }

    // === Invalidation ===

    /// Drop `id` from the inflated tier and both snapshot tiers.
    pub fn invalidate(&self, id: NodeId) {
        self.inflated.remove(id);
        self.assets.invalidate(NodeKind::Container, id);
        self.leaves.invalidate(NodeKind::Leaf, id);
    }

    pub fn invalidate_many(&self, ids: &[NodeId]) {
        for id in ids {
            self.invalidate(*id);
        }
    }

    /// Drop only the inflated entries of `ids`.
    pub(crate) fn evict_inflated(&self, ids: &[NodeId]) -> u64 {
        self.inflated.remove_many(ids)
    }

    /// Drop every inflated tree that holds a slot for any of `ids`, whether
    /// as its root or as a resolved parent or child.
    pub(crate) fn evict_embedding(&self, ids: &[NodeId]) -> u64 {
        if ids.is_empty() {
            return 0;
        }
        self.inflated
            .remove_where(|node| ids.iter().any(|id| node.tree.lookup(*id).is_some()))
    }

    /// Empty every tier, aggregates included.
    pub fn invalidate_all(&self) {
        let inflated = self.inflated.clear();
        let assets = self.assets.clear();
        let leaves = self.leaves.clear();
        self.aggregates.clear();
        tracing::info!(inflated, assets, leaves, "all cache tiers cleared");
    }

    pub fn aggregates(&self) -> &AggregateCache {
        &self.aggregates
    }

    pub fn report(&self) -> CacheReport {
        CacheReport {
            inflated: self.inflated.stats(),
            assets: self.assets.stats(),
            leaves: self.leaves.stats(),
            aggregates: self.aggregates.stats(),
        }
    }
}
