//! The [`Node`] handle.
//!
//! A node is a cheap, clonable view of one slot in a [`NodeTree`]. Scalar
//! accessors inflate a stub on first use, so every getter that may touch the
//! store returns a [`VitrineResult`]. Setters require a writable tree and mark
//! the node dirty; nothing reaches the store until
//! [`Gallery::save`](crate::Gallery::save).

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use vitrine_core::{
    AlbumRecord, GalleryId, GallerySettings, LeafKind, MediaRecord, MetadataKind, NodeError,
    NodeId, NodeKind, NodeRecord, RenditionKind, RenditionRecord, Timestamp, ValidationError,
    VitrineResult,
};

use crate::metadata::MetadataCollection;
use crate::paths::{rendition_root, MAX_DEPTH};
use crate::tree::{InflationState, NodeData, NodeIdx, NodeTree};

/// Audit fields of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Audit {
    pub created_by: String,
    pub date_added: Timestamp,
    pub last_modified_by: String,
    pub date_last_modified: Timestamp,
}

/// Handle to a container (album) or leaf (media object).
#[derive(Clone)]
pub struct Node {
    pub(crate) tree: Arc<NodeTree>,
    pub(crate) idx: NodeIdx,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("state", &self.state())
            .field("writable", &self.is_writable())
            .finish()
    }
}

impl Node {
    pub(crate) fn new(tree: Arc<NodeTree>, idx: NodeIdx) -> Self {
        Self { tree, idx }
    }

    /// Read slot fields that never need inflation.
    fn peek<R>(&self, f: impl FnOnce(&NodeData) -> R, fallback: R) -> R {
        self.tree.read(self.idx, f).unwrap_or(fallback)
    }

    fn get<R>(&self, f: impl FnOnce(&NodeData) -> R) -> VitrineResult<R> {
        self.ensure_loaded()?;
        self.tree.read(self.idx, f)
    }

    fn update<R>(&self, f: impl FnOnce(&mut NodeData) -> R) -> VitrineResult<R> {
        self.require_writable()?;
        self.ensure_loaded()?;
        self.tree.write(self.idx, |d| {
            d.dirty = true;
            f(d)
        })
    }

    fn album<R>(&self, f: impl FnOnce(&AlbumRecord) -> R) -> VitrineResult<R> {
        let id = self.id();
        self.get(|d| match &d.record {
            NodeRecord::Album(a) => Ok(f(a)),
            NodeRecord::Media(_) => Err(not_a(id, NodeKind::Container)),
        })?
        .map_err(Into::into)
    }

    fn album_mut<R>(&self, f: impl FnOnce(&mut AlbumRecord) -> R) -> VitrineResult<R> {
        if !self.is_container() {
            return Err(not_a(self.id(), NodeKind::Container).into());
        }
        let id = self.id();
        self.update(|d| match &mut d.record {
            NodeRecord::Album(a) => Ok(f(a)),
            NodeRecord::Media(_) => Err(not_a(id, NodeKind::Container)),
        })?
        .map_err(Into::into)
    }

    fn media<R>(&self, f: impl FnOnce(&MediaRecord) -> R) -> VitrineResult<R> {
        let id = self.id();
        self.get(|d| match &d.record {
            NodeRecord::Media(m) => Ok(f(m)),
            NodeRecord::Album(_) => Err(not_a(id, NodeKind::Leaf)),
        })?
        .map_err(Into::into)
    }

    fn media_mut<R>(&self, f: impl FnOnce(&mut NodeData) -> R) -> VitrineResult<R> {
        if !self.is_leaf() {
            return Err(not_a(self.id(), NodeKind::Leaf).into());
        }
        self.update(f)
    }

    // ========================================================================
    // IDENTITY
    // ========================================================================

    pub fn id(&self) -> NodeId {
        self.peek(|d| d.id(), NodeId::NONE)
    }

    pub fn kind(&self) -> NodeKind {
        self.peek(|d| d.kind(), NodeKind::Container)
    }

    pub fn is_container(&self) -> bool {
        self.kind() == NodeKind::Container
    }

    pub fn is_leaf(&self) -> bool {
        self.kind() == NodeKind::Leaf
    }

    /// Not persisted yet. Always agrees with `id().is_new()`.
    pub fn is_new(&self) -> bool {
        self.id().is_new()
    }

    pub fn is_writable(&self) -> bool {
        self.tree.is_writable()
    }

    pub fn is_virtual(&self) -> bool {
        self.peek(|d| d.is_virtual, false)
    }

    pub fn is_dirty(&self) -> bool {
        self.peek(|d| d.dirty, false)
    }

    pub fn state(&self) -> InflationState {
        self.peek(|d| d.state, InflationState::Stub)
    }

    /// Both handles point at the same slot of the same tree.
    pub fn same_as(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.tree, &other.tree) && self.idx == other.idx
    }

    pub fn gallery_id(&self) -> VitrineResult<GalleryId> {
        self.tree.read(self.idx, |d| d.record.gallery_id())
    }

    // ========================================================================
    // INFLATION
    // ========================================================================

    pub(crate) fn require_writable(&self) -> VitrineResult<()> {
        if !self.tree.is_writable() {
            return Err(NodeError::invalid_state(format!(
                "node {} was loaded read-only and cannot be modified",
                self.id()
            ))
            .into());
        }
        Ok(())
    }

    /// Fill a stub from the cache tiers or the store.
    pub(crate) fn ensure_loaded(&self) -> VitrineResult<()> {
        if self.state() != InflationState::Stub {
            return Ok(());
        }
        self.tree.context()?.inflate_stub(self)
    }

    /// Load this node's fields and, when asked, its children.
    ///
    /// Repeating a call is a no-op. Asking a node whose children are already
    /// attached to inflate without them is an [`NodeError::InvalidState`]:
    /// children are never dropped once attached.
    pub fn inflate(&self, include_children: bool) -> VitrineResult<()> {
        match self.state() {
            InflationState::New => Ok(()),
            InflationState::Deep if !include_children => Err(NodeError::invalid_state(format!(
                "node {} already has its children attached",
                self.id()
            ))
            .into()),
            InflationState::Deep => Ok(()),
            InflationState::Stub | InflationState::Shallow => {
                if include_children && self.is_container() {
                    self.tree.context()?.inflate_children(self)
                } else {
                    self.ensure_loaded()
                }
            }
        }
    }

    // ========================================================================
    // RECORD AND METADATA
    // ========================================================================

    /// Copy of the underlying record.
    pub fn record(&self) -> VitrineResult<NodeRecord> {
        self.get(|d| d.record.clone())
    }

    pub fn metadata(&self) -> VitrineResult<MetadataCollection> {
        self.get(|d| d.metadata.clone())
    }

    pub fn metadata_value(&self, kind: MetadataKind) -> VitrineResult<Option<String>> {
        self.get(|d| d.metadata.value(kind).map(str::to_string))
    }

    /// Set one metadata item. An empty value removes the item unless the
    /// kind is always present. Title and FileName keep their scalar
    /// counterparts in step.
    pub fn set_metadata_value(&self, kind: MetadataKind, value: &str) -> VitrineResult<()> {
        let value = value.trim();
        self.update(|d| {
            match kind {
                MetadataKind::Title => d.set_title(value),
                MetadataKind::FileName if !value.is_empty() => {
                    if let NodeRecord::Media(m) = &mut d.record {
                        m.original.file_name = value.to_string();
                    }
                    d.metadata.set(kind, value, None);
                }
                _ if value.is_empty() && !kind.is_required() => {
                    d.metadata.mark_deleted(kind);
                }
                _ => {
                    d.metadata.set(kind, value, None);
                }
            }
        })
    }

    // ========================================================================
    // SHARED SCALARS
    // ========================================================================

    pub fn title(&self) -> VitrineResult<String> {
        self.get(|d| d.title().to_string())
    }

    pub fn set_title(&self, title: &str) -> VitrineResult<()> {
        self.update(|d| d.set_title(title.trim()))
    }

    pub fn sequence(&self) -> VitrineResult<i32> {
        self.get(|d| d.record.sequence())
    }

    pub fn set_sequence(&self, sequence: i32) -> VitrineResult<()> {
        self.update(|d| d.set_sequence(sequence))
    }

    pub fn is_private(&self) -> VitrineResult<bool> {
        self.get(|d| d.is_private())
    }

    pub fn set_private(&self, is_private: bool) -> VitrineResult<()> {
        self.update(|d| d.set_private(is_private))
    }

    pub fn audit(&self) -> VitrineResult<Audit> {
        self.get(|d| match &d.record {
            NodeRecord::Album(a) => Audit {
                created_by: a.created_by.clone(),
                date_added: a.date_added,
                last_modified_by: a.last_modified_by.clone(),
                date_last_modified: a.date_last_modified,
            },
            NodeRecord::Media(m) => Audit {
                created_by: m.created_by.clone(),
                date_added: m.date_added,
                last_modified_by: m.last_modified_by.clone(),
                date_last_modified: m.date_last_modified,
            },
        })
    }

    // ========================================================================
    // TREE
    // ========================================================================

    /// Id of the containing album as recorded on this node. `None` for a root
    /// album; [`NodeId::NONE`] for a leaf that belongs to no album.
    pub fn parent_id(&self) -> VitrineResult<Option<NodeId>> {
        self.get(|d| d.record.parent_id())
    }

    /// The containing album, resolved lazily within this node's tree.
    pub fn parent(&self) -> VitrineResult<Option<Node>> {
        self.ensure_loaded()?;
        let (linked, parent_id, gallery_id) = self.tree.read(self.idx, |d| {
            (d.parent, d.record.parent_id(), d.record.gallery_id())
        })?;
        if let Some(idx) = linked {
            return Ok(Some(Node::new(self.tree.clone(), idx)));
        }
        let Some(parent_id) = parent_id.filter(|id| id.is_persisted()) else {
            return Ok(None);
        };

        let idx = {
            let mut inner = self.tree.write_inner();
            let idx = match inner.index.get(&parent_id).copied() {
                Some(idx) => idx,
                None => inner.push(NodeData::stub(parent_id, NodeKind::Container, gallery_id)),
            };
            let slot = inner.slot_mut(self.idx)?;
            // Another thread may have linked it meanwhile.
            if slot.parent.is_none() {
                slot.parent = Some(idx);
            }
            idx
        };
        Ok(Some(Node::new(self.tree.clone(), idx)))
    }

    /// Children in attachment order, attaching the stored ones on first use.
    pub fn children(&self) -> VitrineResult<Vec<Node>> {
        if !self.is_container() {
            return Ok(Vec::new());
        }
        if matches!(self.state(), InflationState::Stub | InflationState::Shallow) {
            self.tree.context()?.inflate_children(self)?;
        }
        let indices = self.tree.read(self.idx, |d| d.children.clone())?;
        Ok(indices
            .into_iter()
            .map(|idx| Node::new(self.tree.clone(), idx))
            .collect())
    }

    pub fn child_containers(&self) -> VitrineResult<Vec<Node>> {
        Ok(self.children()?.into_iter().filter(Node::is_container).collect())
    }

    pub fn child_leaves(&self) -> VitrineResult<Vec<Node>> {
        Ok(self.children()?.into_iter().filter(Node::is_leaf).collect())
    }

    /// Whether `self` is `other` or sits somewhere below it.
    pub(crate) fn is_within(&self, other: &Node) -> VitrineResult<bool> {
        let other_id = other.id();
        let mut current = Some(self.clone());
        let mut depth = 0;
        while let Some(node) = current {
            if node.same_as(other) || (other_id.is_persisted() && node.id() == other_id) {
                return Ok(true);
            }
            depth += 1;
            if depth > MAX_DEPTH {
                return Err(ValidationError::CircularReference {
                    id: self.id(),
                    destination: other_id,
                }
                .into());
            }
            current = node.parent()?;
        }
        Ok(false)
    }

    /// Attach `child` to this container and return its handle in this tree.
    ///
    /// A child from another tree is imported as a copy of its own slot. The
    /// child's parent is set to this container, except for virtual containers,
    /// which group nodes without owning them. An already present child, or a
    /// container that would end up inside itself, is rejected.
    pub fn add_child(&self, child: &Node) -> VitrineResult<Node> {
        if !self.is_container() {
            return Err(not_a(self.id(), NodeKind::Container).into());
        }
        let is_virtual = self.is_virtual();
        if !is_virtual {
            self.require_writable()?;
        }
        self.ensure_loaded()?;
        child.ensure_loaded()?;

        let (child_id, child_kind) = (child.id(), child.kind());
        if !is_virtual && child.is_container() && self.is_within(child)? {
            return Err(ValidationError::CircularReference {
                id: child_id,
                destination: self.id(),
            }
            .into());
        }

        let same_tree = Arc::ptr_eq(&self.tree, &child.tree);
        let imported = if same_tree {
            None
        } else {
            Some(child.tree.read(child.idx, NodeData::detached)?)
        };
        let parent_id = self.id();

        let mut inner = self.tree.write_inner();
        let duplicate = inner.slot(self.idx)?.children.iter().any(|c| {
            (same_tree && *c == child.idx)
                || (child_id.is_persisted()
                    && inner
                        .slots
                        .get(*c)
                        .is_some_and(|s| s.id() == child_id && s.kind() == child_kind))
        });
        if duplicate {
            return Err(NodeError::invalid_state(format!(
                "{} {} is already a child of {}",
                child_kind, child_id, parent_id
            ))
            .into());
        }

        let idx = match imported {
            Some(data) => inner.adopt(data),
            None => child.idx,
        };
        if !is_virtual {
            inner.unlink(idx);
            let slot = inner.slot_mut(idx)?;
            slot.parent = Some(self.idx);
            slot.set_parent_id(Some(parent_id));
            slot.dirty = true;
        }
        inner.slot_mut(self.idx)?.children.push(idx);
        drop(inner);

        tracing::debug!(parent = %parent_id, child = %child_id, virtual_parent = is_virtual, "child added");
        Ok(Node::new(self.tree.clone(), idx))
    }

    /// Detach a child from this container. The child's parent is reset to
    /// the null parent.
    pub fn remove_child(&self, child: &Node) -> VitrineResult<()> {
        if !self.is_container() {
            return Err(not_a(self.id(), NodeKind::Container).into());
        }
        let is_virtual = self.is_virtual();
        if !is_virtual {
            self.require_writable()?;
        }
        let (child_id, child_kind) = (child.id(), child.kind());
        let same_tree = Arc::ptr_eq(&self.tree, &child.tree);
        let parent_id = self.id();

        let mut inner = self.tree.write_inner();
        let member = inner.slot(self.idx)?.children.iter().copied().find(|c| {
            (same_tree && *c == child.idx)
                || (child_id.is_persisted()
                    && inner
                        .slots
                        .get(*c)
                        .is_some_and(|s| s.id() == child_id && s.kind() == child_kind))
        });
        let Some(idx) = member else {
            return Err(NodeError::invalid_state(format!(
                "{} {} is not a child of {}",
                child_kind, child_id, parent_id
            ))
            .into());
        };

        inner.slot_mut(self.idx)?.children.retain(|c| *c != idx);
        if !is_virtual {
            let slot = inner.slot_mut(idx)?;
            slot.parent = None;
            slot.set_parent_id(None);
            slot.dirty = true;
        }
        drop(inner);

        tracing::debug!(parent = %parent_id, child = %child_id, "child removed");
        Ok(())
    }

    // ========================================================================
    // CONTAINER FIELDS
    // ========================================================================

    pub fn directory_name(&self) -> VitrineResult<String> {
        self.album(|a| a.directory_name.clone())
    }

    pub fn set_directory_name(&self, name: &str) -> VitrineResult<()> {
        let name = name.trim().to_string();
        self.album_mut(|a| a.directory_name = name)
    }

    /// Leaf representing this container, or [`NodeId::NONE`].
    pub fn thumbnail_id(&self) -> VitrineResult<NodeId> {
        self.album(|a| a.thumbnail_id)
    }

    pub fn set_thumbnail_id(&self, id: NodeId) -> VitrineResult<()> {
        self.album_mut(|a| a.thumbnail_id = id)
    }

    pub fn sort_by(&self) -> VitrineResult<MetadataKind> {
        self.album(|a| a.sort_by)
    }

    pub fn sort_ascending(&self) -> VitrineResult<bool> {
        self.album(|a| a.sort_ascending)
    }

    pub fn set_sort(&self, sort_by: MetadataKind, ascending: bool) -> VitrineResult<()> {
        self.album_mut(|a| {
            a.sort_by = sort_by;
            a.sort_ascending = ascending;
        })
    }

    pub fn owned_by(&self) -> VitrineResult<String> {
        self.album(|a| a.owned_by.clone())
    }

    pub fn owner_role_name(&self) -> VitrineResult<String> {
        self.album(|a| a.owner_role_name.clone())
    }

    pub fn set_owner(&self, owned_by: &str, owner_role_name: &str) -> VitrineResult<()> {
        let (owned_by, role) = (owned_by.to_string(), owner_role_name.to_string());
        self.album_mut(|a| {
            a.owned_by = owned_by;
            a.owner_role_name = role;
        })
    }

    /// Directory of this container relative to a media root, derived from
    /// the in-memory parent chain. Empty for a root album; for a leaf, the
    /// directory of its album.
    pub fn relative_dir(&self) -> VitrineResult<PathBuf> {
        let mut segments = Vec::new();
        let mut current = if self.is_container() {
            Some(self.clone())
        } else {
            self.parent()?
        };
        let mut depth = 0;
        while let Some(node) = current {
            depth += 1;
            if depth > MAX_DEPTH {
                return Err(ValidationError::CircularReference {
                    id: self.id(),
                    destination: node.id(),
                }
                .into());
            }
            let (parent_id, name) =
                node.album(|a| (a.parent_id, a.directory_name.clone()))?;
            if parent_id.is_some() {
                segments.push(name);
            }
            current = node.parent()?;
        }
        Ok(segments.iter().rev().collect())
    }

    /// Absolute path: the directory of a container, the original file of a
    /// leaf.
    pub fn path(&self) -> VitrineResult<PathBuf> {
        let context = self.tree.context()?;
        let settings = context.settings(self.gallery_id()?)?;
        match self.kind() {
            NodeKind::Container => Ok(settings.media_object_path.join(self.relative_dir()?)),
            NodeKind::Leaf => Ok(self
                .rendition_path_with(&settings, RenditionKind::Original)?
                .unwrap_or_else(|| settings.media_object_path.clone())),
        }
    }

    // ========================================================================
    // LEAF FIELDS
    // ========================================================================

    pub fn leaf_kind(&self) -> VitrineResult<LeafKind> {
        let id = self.id();
        self.media(|m| m.leaf_kind())?
            .map_err(|e| NodeError::UnsupportedKind { id, discriminator: e.0 }.into())
    }

    pub fn rendition(&self, kind: RenditionKind) -> VitrineResult<RenditionRecord> {
        let id = self.id();
        self.get(|d| d.rendition(kind).cloned())?
            .ok_or_else(|| not_a(id, NodeKind::Leaf).into())
    }

    /// Replace one rendition. Replacing the original keeps the FileName item
    /// in step with the new file name.
    pub fn set_rendition(&self, kind: RenditionKind, rendition: RenditionRecord) -> VitrineResult<()> {
        self.media_mut(|d| {
            let file_name = rendition.file_name.clone();
            if let NodeRecord::Media(m) = &mut d.record {
                match kind {
                    RenditionKind::Thumbnail => m.thumbnail = rendition,
                    RenditionKind::Optimized => m.optimized = rendition,
                    RenditionKind::Original => m.original = rendition,
                }
            }
            if kind == RenditionKind::Original && !file_name.is_empty() {
                d.metadata.set(MetadataKind::FileName, &file_name, None);
            }
        })
    }

    pub fn original_file_name(&self) -> VitrineResult<String> {
        self.media(|m| m.original.file_name.clone())
    }

    /// Rename the original. The file itself is renamed on the next save.
    pub fn set_original_file_name(&self, file_name: &str) -> VitrineResult<()> {
        if file_name.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "original_file_name".to_string(),
            }
            .into());
        }
        self.set_metadata_value(MetadataKind::FileName, file_name)
    }

    pub fn hash_key(&self) -> VitrineResult<String> {
        self.media(|m| m.hash_key.clone())
    }

    pub fn external_html(&self) -> VitrineResult<Option<String>> {
        self.media(|m| m.external_html.clone())
    }

    pub fn set_external_html(&self, html: Option<String>) -> VitrineResult<()> {
        self.media_mut(|d| {
            if let NodeRecord::Media(m) = &mut d.record {
                m.external_html = html;
            }
        })
    }

    /// Absolute path of one rendition file, `None` when the rendition has no
    /// file (external content, or not generated yet).
    pub fn rendition_path(&self, kind: RenditionKind) -> VitrineResult<Option<PathBuf>> {
        let context = self.tree.context()?;
        let settings = context.settings(self.gallery_id()?)?;
        self.rendition_path_with(&settings, kind)
    }

    pub(crate) fn rendition_path_with(
        &self,
        settings: &GallerySettings,
        kind: RenditionKind,
    ) -> VitrineResult<Option<PathBuf>> {
        if !self.is_leaf() {
            return Ok(None);
        }
        let rendition = self.rendition(kind)?;
        if !rendition.has_file() {
            return Ok(None);
        }
        let dir = self.relative_dir()?;
        Ok(Some(rendition_root(settings, kind).join(dir).join(&rendition.file_name)))
    }
}

fn not_a(id: NodeId, expected: NodeKind) -> NodeError {
    NodeError::invalid_state(format!("node {} is not a {}", id, expected))
}
