//! Vitrine Engine - Node Materialization and Cache Coherency
//!
//! Materializes album trees from a record store through three cache tiers,
//! and keeps those tiers coherent across save, delete, move, copy and sort.
//!
//! ```text
//! Gallery ──► EngineContext ──► CacheTiers (inflated / asset / leaf / aggregates)
//!                 │                   │
//!                 ▼                   ▼
//!            NodeTree arena      RecordStore, FileMover
//! ```
//!
//! [`Gallery`] is the only entry point. Nodes loaded with [`Gallery::load`]
//! are shared read-only views served from the inflated tier; nodes loaded
//! with [`Gallery::load_writable`] or created through the gallery are private
//! to the caller and may be modified and saved.

mod cache;
mod context;
mod events;
mod loader;
mod metadata;
mod mutator;
mod node;
mod paths;
pub mod telemetry;
mod thumbnail;
mod tree;

use std::sync::Arc;

pub use cache::{CacheReport, CacheTiers};
pub use events::{DeletedEvent, NodeObserver};
pub use metadata::{
    render_template, CommitMode, ExtractedValue, ExtractionRequest, HtmlTagStripper,
    MetadataCollection, MetadataExtractor, MetadataItem, MetadataSummary, NoopExtractor, Sanitizer,
};
pub use mutator::SortOptions;
pub use node::{Audit, Node};
pub use paths::{
    directory_roots, rendition_root, sanitize_directory_name, unique_directory_name,
    unique_file_name,
};
pub use thumbnail::RepairOptions;
pub use tree::InflationState;

use vitrine_core::{
    EngineConfig, GalleryId, GalleryRecord, GallerySettings, LeafKind, MetadataKind, NodeError,
    NodeId, NodeKind, NodeRecord, RoleRecord, SettingName, ValidationError, VitrineResult,
};
use vitrine_storage::{FileMover, LocalFileMover, RecordStore};

use crate::context::EngineContext;
use crate::tree::{NodeData, NodeTree};

// ============================================================================
// BUILDER
// ============================================================================

/// Assembles a [`Gallery`] from its collaborators.
pub struct GalleryBuilder {
    store: Arc<dyn RecordStore>,
    files: Option<Arc<dyn FileMover>>,
    config: Option<EngineConfig>,
    caches: Option<CacheTiers>,
    extractor: Option<Arc<dyn MetadataExtractor>>,
    sanitizer: Option<Arc<dyn Sanitizer>>,
    observers: Vec<Arc<dyn NodeObserver>>,
}

impl GalleryBuilder {
    pub fn files(mut self, files: Arc<dyn FileMover>) -> Self {
        self.files = Some(files);
        self
    }

    /// Cache backends and capacities. Ignored when [`caches`](Self::caches)
    /// is also given.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn caches(mut self, caches: CacheTiers) -> Self {
        self.caches = Some(caches);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn MetadataExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn sanitizer(mut self, sanitizer: Arc<dyn Sanitizer>) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn NodeObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn build(self) -> VitrineResult<Gallery> {
        if let Some(config) = &self.config {
            telemetry::init_from_config(config);
        }
        let caches = match (self.caches, self.config) {
            (Some(caches), _) => caches,
            (None, Some(config)) => CacheTiers::from_config(&config)?,
            (None, None) => CacheTiers::from_config(&EngineConfig::default())?,
        };
        let files = self
            .files
            .unwrap_or_else(|| Arc::new(LocalFileMover::new()) as Arc<dyn FileMover>);
        let extractor = self
            .extractor
            .unwrap_or_else(|| Arc::new(NoopExtractor) as Arc<dyn MetadataExtractor>);
        let sanitizer = self
            .sanitizer
            .unwrap_or_else(|| Arc::new(HtmlTagStripper) as Arc<dyn Sanitizer>);

        let context = EngineContext::new(self.store, files, caches, extractor, sanitizer, self.observers);
        tracing::debug!(caches = ?context.caches, "gallery engine built");
        Ok(Gallery {
            context: Arc::new(context),
        })
    }
}

// ============================================================================
// GALLERY
// ============================================================================

/// Entry point to the engine. Cheap to clone; clones share every cache.
#[derive(Clone)]
pub struct Gallery {
    context: Arc<EngineContext>,
}

impl std::fmt::Debug for Gallery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gallery")
            .field("caches", &self.context.caches)
            .field("shut_down", &self.context.is_shut_down())
            .finish()
    }
}

impl Gallery {
    pub fn builder(store: Arc<dyn RecordStore>) -> GalleryBuilder {
        GalleryBuilder {
            store,
            files: None,
            config: None,
            caches: None,
            extractor: None,
            sanitizer: None,
            observers: Vec::new(),
        }
    }

    /// Gallery with in-memory caches and the default extractor and sanitizer.
    pub fn new(store: Arc<dyn RecordStore>, files: Arc<dyn FileMover>) -> VitrineResult<Self> {
        Self::builder(store).files(files).build()
    }

    // ========================================================================
    // LOADING
    // ========================================================================

    /// Read-only view of a container or leaf, served from the inflated tier
    /// when present.
    pub fn load(&self, id: NodeId) -> VitrineResult<Node> {
        self.context.load_node(id, false, None)
    }

    /// Read-only view of a container. A leaf id is reported as not found.
    pub fn load_container(&self, id: NodeId) -> VitrineResult<Node> {
        self.context.load_node(id, false, Some(NodeKind::Container))
    }

    /// Read-only view of a leaf. A container id is reported as not found.
    pub fn load_leaf(&self, id: NodeId) -> VitrineResult<Node> {
        self.context.load_node(id, false, Some(NodeKind::Leaf))
    }

    /// A private copy that may be modified and saved. Never cached as an
    /// inflated node.
    pub fn load_writable(&self, id: NodeId) -> VitrineResult<Node> {
        self.context.load_node(id, true, None)
    }

    /// Read-only view of a gallery's root album.
    pub fn load_root(&self, gallery_id: GalleryId) -> VitrineResult<Node> {
        self.context.ensure_running()?;
        let root = self
            .context
            .store
            .root_album(gallery_id)?
            .ok_or(NodeError::NotFound {
                id: NodeId::NONE,
                expected: Some(NodeKind::Container),
            })?;
        self.load_container(root.id)
    }

    // ========================================================================
    // CREATION
    // ========================================================================

    /// A new, unsaved album below the album `parent_id`.
    pub fn create_empty(&self, parent_id: NodeId) -> VitrineResult<Node> {
        self.context.ensure_running()?;
        let snapshot = self
            .context
            .fetch_snapshot(parent_id, Some(NodeKind::Container))?;
        let tree = NodeTree::new(Arc::downgrade(&self.context), true);
        let parent = tree.push(NodeData::from_snapshot(&snapshot));
        let gallery_id = snapshot.gallery_id();
        let idx = tree.insert_child(parent, self.new_album_data(gallery_id, Some(parent_id))?)?;
        Ok(Node::new(tree, idx))
    }

    /// A new, unsaved album inside `parent`, sharing its tree.
    pub fn create_container(&self, parent: &Node) -> VitrineResult<Node> {
        self.require_container_parent(parent)?;
        let gallery_id = parent.gallery_id()?;
        let data = self.new_album_data(gallery_id, Some(parent.id()))?;
        let idx = parent.tree.insert_child(parent.idx, data)?;
        Ok(Node::new(parent.tree.clone(), idx))
    }

    /// A new, unsaved leaf inside `parent` for the original file `file_name`.
    pub fn create_leaf(&self, parent: &Node, file_name: &str, kind: LeafKind) -> VitrineResult<Node> {
        self.require_container_parent(parent)?;
        let file_name = file_name.trim();
        if file_name.is_empty() && kind.has_original_file() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "file_name".to_string(),
            }
            .into());
        }
        let gallery_id = parent.gallery_id()?;
        let mut data = NodeData::new_leaf(gallery_id, parent.id(), kind.as_db_str(), file_name);
        if !file_name.is_empty() {
            data.metadata.set(MetadataKind::FileName, file_name, None);
        }
        let idx = parent.tree.insert_child(parent.idx, data)?;
        Ok(Node::new(parent.tree.clone(), idx))
    }

    /// A new, unsaved root album for a gallery that has none.
    pub fn create_root(&self, gallery_id: GalleryId) -> VitrineResult<Node> {
        self.context.ensure_running()?;
        if let Some(root) = self.context.store.root_album(gallery_id)? {
            return Err(ValidationError::InvalidValue {
                field: "parent_id".to_string(),
                reason: format!("gallery {} already has root album {}", gallery_id, root.id),
            }
            .into());
        }
        let tree = NodeTree::new(Arc::downgrade(&self.context), true);
        let idx = tree.push(self.new_album_data(gallery_id, None)?);
        Ok(Node::new(tree, idx))
    }

    /// An ephemeral album for grouping nodes, such as search results.
    ///
    /// Children added to it keep their own parent, and it can never be
    /// saved, moved or deleted.
    pub fn create_virtual_container(&self, gallery_id: GalleryId) -> VitrineResult<Node> {
        self.context.ensure_running()?;
        let tree = NodeTree::new(Arc::downgrade(&self.context), true);
        let mut data = NodeData::new_container(gallery_id, None);
        data.is_virtual = true;
        let idx = tree.push(data);
        Ok(Node::new(tree, idx))
    }

    fn new_album_data(&self, gallery_id: GalleryId, parent_id: Option<NodeId>) -> VitrineResult<NodeData> {
        let settings = self.context.settings(gallery_id)?;
        let mut data = NodeData::new_container(gallery_id, parent_id);
        if let NodeRecord::Album(album) = &mut data.record {
            album.sort_by = settings.default_album_sort_kind;
            album.sort_ascending = settings.default_album_sort_ascending;
        }
        Ok(data)
    }

    fn require_container_parent(&self, parent: &Node) -> VitrineResult<()> {
        self.context.ensure_running()?;
        if !parent.is_container() {
            return Err(NodeError::invalid_state(format!(
                "node {} is a {} and cannot hold children",
                parent.id(),
                parent.kind()
            ))
            .into());
        }
        parent.require_writable()?;
        parent.ensure_loaded()
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Persist a writable node, assigning an id when it is new.
    pub fn save(&self, node: &Node, username: &str) -> VitrineResult<()> {
        let _guard = EngineContext::lock(&self.context.locks.mutation)?;
        self.context.save_node(node, username)
    }

    /// Delete a node and everything below it. Files are removed unless
    /// `keep_files` is set.
    pub fn delete(&self, node: &Node, keep_files: bool) -> VitrineResult<DeletedEvent> {
        let _guard = EngineContext::lock(&self.context.locks.mutation)?;
        self.context.delete_node(node, keep_files)
    }

    /// Move a writable node into `destination` and persist it.
    pub fn move_to(&self, node: &Node, destination: &Node, username: &str) -> VitrineResult<()> {
        let _guard = EngineContext::lock(&self.context.locks.mutation)?;
        self.context.move_node(node, destination, username)
    }

    /// Copy `node` and everything below it into `destination`. Returns the
    /// saved copy.
    pub fn copy_to(&self, node: &Node, destination: &Node, username: &str) -> VitrineResult<Node> {
        let _guard = EngineContext::lock(&self.context.locks.mutation)?;
        self.context.copy_node(node, destination, username)
    }

    /// Renumber the children of an album by its sort field.
    pub fn sort(&self, node: &Node, options: &SortOptions) -> VitrineResult<()> {
        let _guard = EngineContext::lock(&self.context.locks.mutation)?;
        self.context.sort_node(node, options)
    }

    /// Reassign an album's thumbnail when it is missing.
    pub fn repair_thumbnail(&self, node: &Node, options: RepairOptions) -> VitrineResult<()> {
        let _guard = EngineContext::lock(&self.context.locks.mutation)?;
        self.context.repair_thumbnail(node, options)
    }

    /// Re-render a writable node's metadata in memory. Save to persist it.
    pub fn refresh_metadata(&self, node: &Node, mode: CommitMode) -> VitrineResult<MetadataSummary> {
        self.context.ensure_running()?;
        self.context.build_metadata(node, mode)
    }

    // ========================================================================
    // SETTINGS, ROLES, GALLERIES
    // ========================================================================

    pub fn settings(&self, gallery_id: GalleryId) -> VitrineResult<Arc<GallerySettings>> {
        self.context.settings(gallery_id)
    }

    /// Store one setting after checking the resulting settings are valid.
    pub fn save_setting(&self, gallery_id: GalleryId, name: SettingName, value: &str) -> VitrineResult<()> {
        let mut settings = (*self.context.settings(gallery_id)?).clone();
        settings.apply(name, value)?;
        settings.validate()?;
        self.context
            .store
            .setting_save(gallery_id, name.as_str(), value)?;
        self.context.caches.aggregates().purge_settings(gallery_id);
        tracing::info!(gallery_id, setting = name.as_str(), "setting saved");
        Ok(())
    }

    pub fn roles(&self, gallery_id: GalleryId) -> VitrineResult<Arc<Vec<RoleRecord>>> {
        self.context.roles(gallery_id)
    }

    /// Roles that apply to `node`: assigned to it or to an album above it.
    pub fn roles_for(&self, node: &Node) -> VitrineResult<Vec<RoleRecord>> {
        let start = match node.kind() {
            NodeKind::Container if node.id().is_persisted() => Some(node.id()),
            _ => node.parent_id()?,
        };
        let chain = self.context.ancestor_ids(start);
        let roles = self.context.roles(node.gallery_id()?)?;
        Ok(roles
            .iter()
            .filter(|role| chain.iter().any(|id| role.is_assigned_to(*id)))
            .cloned()
            .collect())
    }

    pub fn save_role(&self, role: &RoleRecord) -> VitrineResult<()> {
        self.context.store.role_save(role)?;
        self.context.caches.aggregates().purge_roles();
        tracing::info!(role = %role.name, gallery_id = role.gallery_id, "role saved");
        Ok(())
    }

    pub fn galleries(&self) -> VitrineResult<Arc<Vec<GalleryRecord>>> {
        self.context.galleries()
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Observers registered after build run for later mutations only.
    pub fn register_observer(&self, observer: Arc<dyn NodeObserver>) -> VitrineResult<()> {
        let mut observers = self
            .context
            .observers
            .write()
            .map_err(|_| vitrine_core::StorageError::LockPoisoned)?;
        observers.push(observer);
        Ok(())
    }

    pub fn caches(&self) -> &CacheTiers {
        &self.context.caches
    }

    pub fn cache_report(&self) -> CacheReport {
        self.context.caches.report()
    }

    /// Empty every cache tier and refuse further work. Outstanding nodes
    /// keep what they already loaded but can no longer inflate.
    pub fn shutdown(&self) {
        self.context.caches.invalidate_all();
        self.context.mark_shut_down();
        tracing::info!("gallery engine shut down");
    }
}
