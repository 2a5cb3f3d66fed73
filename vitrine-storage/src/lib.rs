//! Vitrine Storage - Record Store Trait and Mock Implementation
//!
//! Defines the narrow contracts the engine consumes from its external
//! collaborators (the relational record store and the physical file mover)
//! together with in-memory implementations, and the cache backends the
//! engine's cache tiers are built from.

pub mod cache;
pub mod files;

pub use cache::{
    AggregateCache, CacheKey, CacheStats, InflatedCache, LmdbCacheError, LmdbSnapshotBackend,
    MemorySnapshotBackend, SnapshotBackend, SnapshotCache,
};
pub use files::{FileMover, LocalFileMover, MockFileMover};

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use vitrine_core::{
    AlbumRecord, EntityType, GalleryId, GalleryRecord, MetadataRecord, NodeId, NodeRecord,
    RoleRecord, StorageError, VitrineError, VitrineResult,
};

// ============================================================================
// RECORD STORE TRAIT
// ============================================================================

/// Record store for gallery entities.
///
/// Containers and leaves share one id sequence. Implementations assign ids on
/// insert and cascade deletes to descendants and their metadata the way a
/// relational store with foreign keys would.
pub trait RecordStore: Send + Sync {
    // === Node Operations ===

    /// Get an album or media row by id.
    fn node_get(&self, id: NodeId) -> VitrineResult<Option<NodeRecord>>;

    /// Get the direct children of an album, ordered by sequence then id.
    fn node_children(&self, parent_id: NodeId) -> VitrineResult<Vec<NodeRecord>>;

    /// Insert (when the id is new) or update a row. Returns the stored row.
    fn node_save(&self, record: &NodeRecord) -> VitrineResult<NodeRecord>;

    /// Delete a row and everything below it. Returns the removed ids.
    fn node_delete(&self, id: NodeId) -> VitrineResult<Vec<NodeId>>;

    /// Get the root album of a gallery.
    fn root_album(&self, gallery_id: GalleryId) -> VitrineResult<Option<AlbumRecord>>;

    // === Metadata Operations ===

    /// List the metadata rows of a node, ordered by kind.
    fn metadata_list(&self, node_id: NodeId) -> VitrineResult<Vec<MetadataRecord>>;

    /// Insert (when the id is 0) or update a metadata row.
    fn metadata_save(&self, item: &MetadataRecord) -> VitrineResult<MetadataRecord>;

    /// Delete a metadata row.
    fn metadata_delete(&self, id: i64) -> VitrineResult<()>;

    // === Role Operations ===

    /// List the roles of a gallery.
    fn role_list(&self, gallery_id: GalleryId) -> VitrineResult<Vec<RoleRecord>>;

    /// Insert or replace a role, keyed by gallery and name.
    fn role_save(&self, role: &RoleRecord) -> VitrineResult<()>;

    // === Gallery Operations ===

    /// List every gallery.
    fn gallery_list(&self) -> VitrineResult<Vec<GalleryRecord>>;

    /// Insert or replace a gallery.
    fn gallery_save(&self, gallery: &GalleryRecord) -> VitrineResult<()>;

    // === Setting Operations ===

    /// List the stored name/value pairs of a gallery.
    fn setting_list(&self, gallery_id: GalleryId) -> VitrineResult<Vec<(String, String)>>;

    /// Insert or replace one setting value.
    fn setting_save(&self, gallery_id: GalleryId, name: &str, value: &str) -> VitrineResult<()>;
}

// ============================================================================
// MOCK STORAGE
// ============================================================================

/// In-memory record store for testing.
#[derive(Debug)]
pub struct MockStorage {
    nodes: Arc<RwLock<HashMap<NodeId, NodeRecord>>>,
    metadata: Arc<RwLock<HashMap<i64, MetadataRecord>>>,
    roles: Arc<RwLock<HashMap<(GalleryId, String), RoleRecord>>>,
    galleries: Arc<RwLock<HashMap<GalleryId, GalleryRecord>>>,
    settings: Arc<RwLock<HashMap<GalleryId, Vec<(String, String)>>>>,
    next_id: AtomicI64,
    next_metadata_id: AtomicI64,
    node_reads: AtomicUsize,
}

impl Default for MockStorage {
    fn default() -> Self {
        Self {
            nodes: Arc::default(),
            metadata: Arc::default(),
            roles: Arc::default(),
            galleries: Arc::default(),
            settings: Arc::default(),
            next_id: AtomicI64::new(1),
            next_metadata_id: AtomicI64::new(1),
            node_reads: AtomicUsize::new(0),
        }
    }
}

impl MockStorage {
    /// Create a new mock storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next inserted node receive `id`.
    pub fn set_next_id(&self, id: i64) {
        self.next_id.store(id, Ordering::SeqCst);
    }

    /// Clear all stored data.
    pub fn clear(&self) -> VitrineResult<()> {
        write_lock(&self.nodes)?.clear();
        write_lock(&self.metadata)?.clear();
        write_lock(&self.roles)?.clear();
        write_lock(&self.galleries)?.clear();
        write_lock(&self.settings)?.clear();
        Ok(())
    }

    /// Get count of stored nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.read().map(|n| n.len()).unwrap_or(0)
    }

    /// Get count of stored metadata rows.
    pub fn metadata_count(&self) -> usize {
        self.metadata.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Number of `node_get` calls served so far.
    pub fn node_reads(&self) -> usize {
        self.node_reads.load(Ordering::SeqCst)
    }

    fn parent_is_album(nodes: &HashMap<NodeId, NodeRecord>, parent_id: NodeId) -> bool {
        matches!(nodes.get(&parent_id), Some(NodeRecord::Album(_)))
    }

    fn collect_subtree(nodes: &HashMap<NodeId, NodeRecord>, root: NodeId) -> Vec<NodeId> {
        let mut removed = vec![root];
        let mut cursor = 0;
        while cursor < removed.len() {
            let current = removed[cursor];
            removed.extend(
                nodes
                    .values()
                    .filter(|n| n.parent_id() == Some(current))
                    .map(|n| n.id()),
            );
            cursor += 1;
        }
        removed
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> VitrineResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| VitrineError::Storage(StorageError::LockPoisoned))
}

fn write_lock<T>(lock: &RwLock<T>) -> VitrineResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| VitrineError::Storage(StorageError::LockPoisoned))
}

impl RecordStore for MockStorage {
    // === Node Operations ===

    fn node_get(&self, id: NodeId) -> VitrineResult<Option<NodeRecord>> {
        self.node_reads.fetch_add(1, Ordering::SeqCst);
        let nodes = read_lock(&self.nodes)?;
        Ok(nodes.get(&id).cloned())
    }

    fn node_children(&self, parent_id: NodeId) -> VitrineResult<Vec<NodeRecord>> {
        let nodes = read_lock(&self.nodes)?;
        let mut children: Vec<NodeRecord> = nodes
            .values()
            .filter(|n| n.parent_id() == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by_key(|n| (n.sequence(), n.id()));
        Ok(children)
    }

    fn node_save(&self, record: &NodeRecord) -> VitrineResult<NodeRecord> {
        let mut nodes = write_lock(&self.nodes)?;

        if let Some(parent_id) = record.parent_id() {
            if !Self::parent_is_album(&nodes, parent_id) {
                let reason = format!("parent album {} does not exist", parent_id);
                return Err(if record.id().is_new() {
                    VitrineError::Storage(StorageError::InsertFailed {
                        entity_type: EntityType::Node,
                        reason,
                    })
                } else {
                    VitrineError::Storage(StorageError::UpdateFailed {
                        entity_type: EntityType::Node,
                        id: record.id().get(),
                        reason,
                    })
                });
            }
        }

        let mut stored = record.clone();
        if record.id().is_new() {
            let id = NodeId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
            stored.set_id(id);
        } else {
            match nodes.get(&record.id()) {
                Some(existing) if existing.kind() == record.kind() => {}
                Some(_) => {
                    return Err(VitrineError::Storage(StorageError::UpdateFailed {
                        entity_type: EntityType::Node,
                        id: record.id().get(),
                        reason: "stored row has a different kind".to_string(),
                    }))
                }
                None => {
                    return Err(VitrineError::Storage(StorageError::NotFound {
                        entity_type: EntityType::Node,
                        id: record.id().get(),
                    }))
                }
            }
        }

        nodes.insert(stored.id(), stored.clone());
        Ok(stored)
    }

    fn node_delete(&self, id: NodeId) -> VitrineResult<Vec<NodeId>> {
        let removed = {
            let mut nodes = write_lock(&self.nodes)?;
            if !nodes.contains_key(&id) {
                return Err(VitrineError::Storage(StorageError::NotFound {
                    entity_type: EntityType::Node,
                    id: id.get(),
                }));
            }
            let removed = Self::collect_subtree(&nodes, id);
            for node_id in &removed {
                nodes.remove(node_id);
            }
            removed
        };

        write_lock(&self.metadata)?.retain(|_, m| !removed.contains(&m.node_id));
        for role in write_lock(&self.roles)?.values_mut() {
            role.album_ids.retain(|album_id| !removed.contains(album_id));
        }

        Ok(removed)
    }

    fn root_album(&self, gallery_id: GalleryId) -> VitrineResult<Option<AlbumRecord>> {
        let nodes = read_lock(&self.nodes)?;
        Ok(nodes
            .values()
            .filter_map(|n| match n {
                NodeRecord::Album(a) if a.gallery_id == gallery_id && a.parent_id.is_none() => {
                    Some(a.clone())
                }
                _ => None,
            })
            .min_by_key(|a| a.id))
    }

    // === Metadata Operations ===

    fn metadata_list(&self, node_id: NodeId) -> VitrineResult<Vec<MetadataRecord>> {
        let metadata = read_lock(&self.metadata)?;
        let mut items: Vec<MetadataRecord> = metadata
            .values()
            .filter(|m| m.node_id == node_id)
            .cloned()
            .collect();
        items.sort_by_key(|m| m.kind);
        Ok(items)
    }

    fn metadata_save(&self, item: &MetadataRecord) -> VitrineResult<MetadataRecord> {
        if !read_lock(&self.nodes)?.contains_key(&item.node_id) {
            return Err(VitrineError::Storage(StorageError::InsertFailed {
                entity_type: EntityType::Metadata,
                reason: format!("node {} does not exist", item.node_id),
            }));
        }

        let mut metadata = write_lock(&self.metadata)?;
        let mut stored = item.clone();
        if item.id == 0 {
            let duplicate = metadata
                .values()
                .any(|m| m.node_id == item.node_id && m.kind == item.kind);
            if duplicate {
                return Err(VitrineError::Storage(StorageError::InsertFailed {
                    entity_type: EntityType::Metadata,
                    reason: format!("{} already exists for node {}", item.kind, item.node_id),
                }));
            }
            stored.id = self.next_metadata_id.fetch_add(1, Ordering::SeqCst);
        } else if !metadata.contains_key(&item.id) {
            return Err(VitrineError::Storage(StorageError::NotFound {
                entity_type: EntityType::Metadata,
                id: item.id,
            }));
        }

        metadata.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn metadata_delete(&self, id: i64) -> VitrineResult<()> {
        let mut metadata = write_lock(&self.metadata)?;
        metadata.remove(&id).map(|_| ()).ok_or(VitrineError::Storage(
            StorageError::NotFound {
                entity_type: EntityType::Metadata,
                id,
            },
        ))
    }

    // === Role Operations ===

    fn role_list(&self, gallery_id: GalleryId) -> VitrineResult<Vec<RoleRecord>> {
        let roles = read_lock(&self.roles)?;
        let mut list: Vec<RoleRecord> = roles
            .values()
            .filter(|r| r.gallery_id == gallery_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    fn role_save(&self, role: &RoleRecord) -> VitrineResult<()> {
        let mut roles = write_lock(&self.roles)?;
        roles.insert((role.gallery_id, role.name.clone()), role.clone());
        Ok(())
    }

    // === Gallery Operations ===

    fn gallery_list(&self) -> VitrineResult<Vec<GalleryRecord>> {
        let galleries = read_lock(&self.galleries)?;
        let mut list: Vec<GalleryRecord> = galleries.values().cloned().collect();
        list.sort_by_key(|g| g.id);
        Ok(list)
    }

    fn gallery_save(&self, gallery: &GalleryRecord) -> VitrineResult<()> {
        write_lock(&self.galleries)?.insert(gallery.id, gallery.clone());
        Ok(())
    }

    // === Setting Operations ===

    fn setting_list(&self, gallery_id: GalleryId) -> VitrineResult<Vec<(String, String)>> {
        let settings = read_lock(&self.settings)?;
        Ok(settings.get(&gallery_id).cloned().unwrap_or_default())
    }

    fn setting_save(&self, gallery_id: GalleryId, name: &str, value: &str) -> VitrineResult<()> {
        let mut settings = write_lock(&self.settings)?;
        let pairs = settings.entry(gallery_id).or_default();
        match pairs.iter_mut().find(|(n, _)| n == name) {
            Some(pair) => pair.1 = value.to_string(),
            None => pairs.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vitrine_core::{
        MediaRecord, MetadataKind, RenditionRecord, RolePermissions,
    };

    fn make_test_album(parent_id: Option<NodeId>, directory_name: &str) -> NodeRecord {
        NodeRecord::Album(AlbumRecord {
            id: NodeId::NEW,
            gallery_id: 1,
            parent_id,
            directory_name: directory_name.to_string(),
            title: directory_name.to_string(),
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
        })
    }

    fn make_test_media(album_id: NodeId, file_name: &str, sequence: i32) -> NodeRecord {
        NodeRecord::Media(MediaRecord {
            id: NodeId::NEW,
            gallery_id: 1,
            album_id,
            media_type: "Image".to_string(),
            title: file_name.to_string(),
            hash_key: String::new(),
            thumbnail: RenditionRecord::new(format!("zThumb_{}", file_name), 115, 80, 5),
            optimized: RenditionRecord::default(),
            original: RenditionRecord::new(file_name, 1024, 768, 300),
            external_html: None,
            sequence,
            is_private: false,
            created_by: "admin".to_string(),
            date_added: Utc::now(),
            last_modified_by: "admin".to_string(),
            date_last_modified: Utc::now(),
        })
    }

    fn make_test_metadata(node_id: NodeId, kind: MetadataKind, value: &str) -> MetadataRecord {
        MetadataRecord {
            id: 0,
            node_id,
            kind,
            raw_value: None,
            value: value.to_string(),
        }
    }

    // ========================================================================
    // Node Tests
    // ========================================================================

    #[test]
    fn test_node_save_assigns_shared_ids() {
        let storage = MockStorage::new();
        let root = storage.node_save(&make_test_album(None, "")).unwrap();
        let leaf = storage
            .node_save(&make_test_media(root.id(), "a.jpg", 1))
            .unwrap();
        let child = storage
            .node_save(&make_test_album(Some(root.id()), "trips"))
            .unwrap();

        assert_eq!(root.id(), NodeId::new(1));
        assert_eq!(leaf.id(), NodeId::new(2));
        assert_eq!(child.id(), NodeId::new(3));
        assert_eq!(storage.node_count(), 3);
    }

    #[test]
    fn test_node_save_requires_existing_parent_album() {
        let storage = MockStorage::new();
        let result = storage.node_save(&make_test_media(NodeId::new(99), "a.jpg", 1));
        assert!(matches!(
            result,
            Err(VitrineError::Storage(StorageError::InsertFailed { .. }))
        ));
    }

    #[test]
    fn test_node_save_update_unknown_id_fails() {
        let storage = MockStorage::new();
        let mut album = make_test_album(None, "");
        album.set_id(NodeId::new(50));
        assert!(matches!(
            storage.node_save(&album),
            Err(VitrineError::Storage(StorageError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_node_children_ordered_by_sequence() {
        let storage = MockStorage::new();
        let root = storage.node_save(&make_test_album(None, "")).unwrap();
        storage.node_save(&make_test_media(root.id(), "c.jpg", 3)).unwrap();
        storage.node_save(&make_test_media(root.id(), "a.jpg", 1)).unwrap();
        storage.node_save(&make_test_media(root.id(), "b.jpg", 2)).unwrap();

        let sequences: Vec<i32> = storage
            .node_children(root.id())
            .unwrap()
            .iter()
            .map(|c| c.sequence())
            .collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn test_node_delete_cascades() {
        let storage = MockStorage::new();
        let root = storage.node_save(&make_test_album(None, "")).unwrap();
        let trips = storage
            .node_save(&make_test_album(Some(root.id()), "trips"))
            .unwrap();
        let leaf = storage
            .node_save(&make_test_media(trips.id(), "a.jpg", 1))
            .unwrap();
        storage
            .metadata_save(&make_test_metadata(leaf.id(), MetadataKind::Title, "A"))
            .unwrap();
        storage
            .role_save(&RoleRecord {
                name: "Friends".to_string(),
                gallery_id: 1,
                permissions: RolePermissions::VIEW_ALBUM_OR_MEDIA,
                album_ids: vec![trips.id(), root.id()],
            })
            .unwrap();

        let removed = storage.node_delete(trips.id()).unwrap();

        assert_eq!(removed, vec![trips.id(), leaf.id()]);
        assert!(storage.node_get(leaf.id()).unwrap().is_none());
        assert_eq!(storage.metadata_count(), 0);
        assert_eq!(storage.role_list(1).unwrap()[0].album_ids, vec![root.id()]);
        assert!(storage.node_get(root.id()).unwrap().is_some());
    }

    #[test]
    fn test_root_album() {
        let storage = MockStorage::new();
        assert!(storage.root_album(1).unwrap().is_none());
        let root = storage.node_save(&make_test_album(None, "")).unwrap();
        storage
            .node_save(&make_test_album(Some(root.id()), "child"))
            .unwrap();
        assert_eq!(storage.root_album(1).unwrap().map(|a| a.id), Some(root.id()));
    }

    // ========================================================================
    // Metadata Tests
    // ========================================================================

    #[test]
    fn test_metadata_unique_per_kind() {
        let storage = MockStorage::new();
        let root = storage.node_save(&make_test_album(None, "")).unwrap();
        let saved = storage
            .metadata_save(&make_test_metadata(root.id(), MetadataKind::Title, "Home"))
            .unwrap();
        assert!(saved.id > 0);

        let dup = storage.metadata_save(&make_test_metadata(root.id(), MetadataKind::Title, "x"));
        assert!(dup.is_err());

        let mut update = saved.clone();
        update.value = "Start".to_string();
        storage.metadata_save(&update).unwrap();
        assert_eq!(storage.metadata_list(root.id()).unwrap()[0].value, "Start");

        storage.metadata_delete(saved.id).unwrap();
        assert!(storage.metadata_list(root.id()).unwrap().is_empty());
        assert!(storage.metadata_delete(saved.id).is_err());
    }

    // ========================================================================
    // Setting Tests
    // ========================================================================

    #[test]
    fn test_setting_save_replaces_value() {
        let storage = MockStorage::new();
        storage.setting_save(1, "ExtractMetadata", "true").unwrap();
        storage.setting_save(1, "ExtractMetadata", "false").unwrap();
        storage.setting_save(2, "ExtractMetadata", "true").unwrap();

        assert_eq!(
            storage.setting_list(1).unwrap(),
            vec![("ExtractMetadata".to_string(), "false".to_string())]
        );
    }

    #[test]
    fn test_node_reads_are_counted() {
        let storage = MockStorage::new();
        storage.node_get(NodeId::new(1)).unwrap();
        storage.node_get(NodeId::new(2)).unwrap();
        assert_eq!(storage.node_reads(), 2);
    }
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================
