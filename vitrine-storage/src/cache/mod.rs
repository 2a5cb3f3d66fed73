//! Cache building blocks for the engine's tiers.
//!
//! - [`SnapshotCache`]: asset and leaf tiers. Holds immutable
//!   [`AssetSnapshot`](vitrine_core::AssetSnapshot) values through a pluggable
//!   [`SnapshotBackend`] (in-memory or LMDB), keyed by [`CacheKey`].
//! - [`InflatedCache`]: bounded map of fully hydrated read-only values.
//! - [`AggregateCache`]: lazily populated process-wide lists (galleries,
//!   roles, settings) guarded by named population locks.
//!
//! Misses are never errors. Every tier keeps [`CacheStats`].

pub mod aggregate;
pub mod inflated;
pub mod key;
pub mod lmdb_backend;
pub mod memory_backend;
pub mod snapshot_cache;
pub mod traits;

pub use aggregate::AggregateCache;
pub use inflated::InflatedCache;
pub use key::CacheKey;
pub use lmdb_backend::{LmdbCacheError, LmdbSnapshotBackend};
pub use memory_backend::MemorySnapshotBackend;
pub use snapshot_cache::SnapshotCache;
pub use traits::{CacheStats, SnapshotBackend};

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use vitrine_core::{
        AlbumRecord, AssetSnapshot, ChildIds, ContainerSnapshot, LeafSnapshot, MediaRecord,
        MetadataKind, MetadataRecord, NodeId, RenditionRecord,
    };

    pub fn make_test_container(id: NodeId, children: Option<ChildIds>) -> AssetSnapshot {
        AssetSnapshot::Container(ContainerSnapshot {
            record: AlbumRecord {
                id,
                gallery_id: 1,
                parent_id: None,
                directory_name: String::new(),
                title: "All albums".to_string(),
                sequence: 0,
                is_private: false,
                thumbnail_id: NodeId::NONE,
                sort_by: MetadataKind::DateAdded,
                sort_ascending: true,
                owned_by: String::new(),
                owner_role_name: String::new(),
                created_by: "admin".to_string(),
                date_added: Utc::now(),
                last_modified_by: "admin".to_string(),
                date_last_modified: Utc::now(),
            },
            metadata: vec![MetadataRecord {
                id: 1,
                node_id: id,
                kind: MetadataKind::Title,
                raw_value: None,
                value: "All albums".to_string(),
            }],
            children,
        })
    }

    pub fn make_test_leaf(id: NodeId, album_id: NodeId) -> AssetSnapshot {
        AssetSnapshot::Leaf(LeafSnapshot {
            record: MediaRecord {
                id,
                gallery_id: 1,
                album_id,
                media_type: "Image".to_string(),
                title: "Sunset".to_string(),
                hash_key: String::new(),
                thumbnail: RenditionRecord::new("zThumb_sunset.jpg", 115, 86, 4),
                optimized: RenditionRecord::new("zOpt_sunset.jpg", 640, 480, 60),
                original: RenditionRecord::new("sunset.jpg", 3000, 2250, 1800),
                external_html: None,
                sequence: 1,
                is_private: false,
                created_by: "admin".to_string(),
                date_added: Utc::now(),
                last_modified_by: "admin".to_string(),
                date_last_modified: Utc::now(),
            },
            metadata: Vec::new(),
        })
    }
}
