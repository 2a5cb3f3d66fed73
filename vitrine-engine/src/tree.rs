//! Arena storage for materialized nodes.
//!
//! Every load produces one [`NodeTree`]: a vector of slots plus an index from
//! persisted id to slot. Containers hold the slot indices of their children
//! and children hold the slot index of their container, so the bidirectional
//! links never form reference cycles. A [`Node`](crate::Node) handle is an
//! `Arc` of its tree plus a slot index.
//!
//! Slots that are only known by id (a parent reached through `parent()`, for
//! instance) start as [`InflationState::Stub`] and are filled in on first
//! access.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use chrono::Utc;
use vitrine_core::{
    AlbumRecord, AssetSnapshot, GalleryId, MediaRecord, MetadataKind, NodeError, NodeId, NodeKind,
    NodeRecord, RenditionKind, RenditionRecord, VitrineResult,
};

use crate::context::EngineContext;
use crate::metadata::MetadataCollection;

pub(crate) type NodeIdx = usize;

/// How much of a node has been materialized.
///
/// `New → Shallow` only through a successful save. `Stub → Shallow` on the
/// first property read. `Shallow → Deep` when a container's children are
/// attached. States never move backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InflationState {
    /// Not persisted yet; carries [`NodeId::NEW`].
    New,
    /// Persisted, known only by id and kind.
    Stub,
    /// Scalar fields and metadata loaded.
    Shallow,
    /// Container whose children are attached.
    Deep,
}

/// Parent and name (directory name or original file name) as last persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredLocation {
    pub parent_id: Option<NodeId>,
    pub name: String,
}

#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub record: NodeRecord,
    pub state: InflationState,
    pub parent: Option<NodeIdx>,
    pub children: Vec<NodeIdx>,
    pub metadata: MetadataCollection,
    pub dirty: bool,
    pub is_virtual: bool,
    pub stored: Option<StoredLocation>,
}

impl NodeData {
    pub fn from_snapshot(snapshot: &AssetSnapshot) -> Self {
        let record = match snapshot {
            AssetSnapshot::Container(c) => NodeRecord::Album(c.record.clone()),
            AssetSnapshot::Leaf(l) => NodeRecord::Media(l.record.clone()),
        };
        let stored = Some(location_of(&record));
        Self {
            record,
            state: InflationState::Shallow,
            parent: None,
            children: Vec::new(),
            metadata: MetadataCollection::from_records(snapshot.metadata().to_vec()),
            dirty: false,
            is_virtual: false,
            stored,
        }
    }

    pub fn stub(id: NodeId, kind: NodeKind, gallery_id: GalleryId) -> Self {
        let record = match kind {
            NodeKind::Container => NodeRecord::Album(blank_album(id, gallery_id, None)),
            NodeKind::Leaf => {
                NodeRecord::Media(blank_media(id, gallery_id, NodeId::NONE, "Image", ""))
            }
        };
        Self {
            record,
            state: InflationState::Stub,
            parent: None,
            children: Vec::new(),
            metadata: MetadataCollection::default(),
            dirty: false,
            is_virtual: false,
            stored: None,
        }
    }

    pub fn new_container(gallery_id: GalleryId, parent_id: Option<NodeId>) -> Self {
        Self::fresh(NodeRecord::Album(blank_album(NodeId::NEW, gallery_id, parent_id)))
    }

    pub fn new_leaf(gallery_id: GalleryId, album_id: NodeId, media_type: &str, file_name: &str) -> Self {
        Self::fresh(NodeRecord::Media(blank_media(
            NodeId::NEW,
            gallery_id,
            album_id,
            media_type,
            file_name,
        )))
    }

    fn fresh(record: NodeRecord) -> Self {
        Self {
            record,
            state: InflationState::New,
            parent: None,
            children: Vec::new(),
            metadata: MetadataCollection::default(),
            dirty: true,
            is_virtual: false,
            stored: None,
        }
    }

    /// Fill a stub from a snapshot, keeping its links.
    pub fn fill(&mut self, snapshot: &AssetSnapshot) {
        let loaded = NodeData::from_snapshot(snapshot);
        self.record = loaded.record;
        self.metadata = loaded.metadata;
        self.stored = loaded.stored;
        self.state = InflationState::Shallow;
        self.dirty = false;
    }

    /// Copy of this slot's own data without any links, for placing into
    /// another tree.
    pub fn detached(&self) -> Self {
        let mut copy = self.clone();
        copy.parent = None;
        copy.children.clear();
        if copy.state == InflationState::Deep {
            copy.state = InflationState::Shallow;
        }
        copy
    }

    pub fn id(&self) -> NodeId {
        self.record.id()
    }

    pub fn kind(&self) -> NodeKind {
        self.record.kind()
    }

    pub fn location(&self) -> StoredLocation {
        location_of(&self.record)
    }

    pub fn title(&self) -> &str {
        match &self.record {
            NodeRecord::Album(a) => &a.title,
            NodeRecord::Media(m) => &m.title,
        }
    }

    /// Set the title scalar and its `Title` metadata item together.
    pub fn set_title(&mut self, title: &str) {
        match &mut self.record {
            NodeRecord::Album(a) => a.title = title.to_string(),
            NodeRecord::Media(m) => m.title = title.to_string(),
        }
        self.metadata.set(MetadataKind::Title, title, None);
    }

    pub fn is_private(&self) -> bool {
        match &self.record {
            NodeRecord::Album(a) => a.is_private,
            NodeRecord::Media(m) => m.is_private,
        }
    }

    pub fn set_private(&mut self, is_private: bool) {
        match &mut self.record {
            NodeRecord::Album(a) => a.is_private = is_private,
            NodeRecord::Media(m) => m.is_private = is_private,
        }
    }

    pub fn set_sequence(&mut self, sequence: i32) {
        match &mut self.record {
            NodeRecord::Album(a) => a.sequence = sequence,
            NodeRecord::Media(m) => m.sequence = sequence,
        }
    }

    /// Point the record at a new parent. Leaves use [`NodeId::NONE`] as the
    /// "no album" value.
    pub fn set_parent_id(&mut self, parent_id: Option<NodeId>) {
        match &mut self.record {
            NodeRecord::Album(a) => a.parent_id = parent_id,
            NodeRecord::Media(m) => m.album_id = parent_id.unwrap_or(NodeId::NONE),
        }
    }

    pub fn rendition(&self, kind: RenditionKind) -> Option<&RenditionRecord> {
        match &self.record {
            NodeRecord::Media(m) => Some(match kind {
                RenditionKind::Thumbnail => &m.thumbnail,
                RenditionKind::Optimized => &m.optimized,
                RenditionKind::Original => &m.original,
            }),
            NodeRecord::Album(_) => None,
        }
    }
}

fn location_of(record: &NodeRecord) -> StoredLocation {
    match record {
        NodeRecord::Album(a) => StoredLocation {
            parent_id: a.parent_id,
            name: a.directory_name.clone(),
        },
        NodeRecord::Media(m) => StoredLocation {
            parent_id: Some(m.album_id),
            name: m.original.file_name.clone(),
        },
    }
}

pub(crate) fn blank_album(id: NodeId, gallery_id: GalleryId, parent_id: Option<NodeId>) -> AlbumRecord {
    let now = Utc::now();
    AlbumRecord {
        id,
        gallery_id,
        parent_id,
        directory_name: String::new(),
        title: String::new(),
        sequence: 0,
        is_private: false,
        thumbnail_id: NodeId::NONE,
        sort_by: MetadataKind::DateAdded,
        sort_ascending: true,
        owned_by: String::new(),
        owner_role_name: String::new(),
        created_by: String::new(),
        date_added: now,
        last_modified_by: String::new(),
        date_last_modified: now,
    }
}

pub(crate) fn blank_media(
    id: NodeId,
    gallery_id: GalleryId,
    album_id: NodeId,
    media_type: &str,
    file_name: &str,
) -> MediaRecord {
    let now = Utc::now();
    MediaRecord {
        id,
        gallery_id,
        album_id,
        media_type: media_type.to_string(),
        title: String::new(),
        hash_key: String::new(),
        thumbnail: RenditionRecord::default(),
        optimized: RenditionRecord::default(),
        original: RenditionRecord::new(file_name, 0, 0, 0),
        external_html: None,
        sequence: 0,
        is_private: false,
        created_by: String::new(),
        date_added: now,
        last_modified_by: String::new(),
        date_last_modified: now,
    }
}

// ============================================================================
// TREE
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct TreeInner {
    pub slots: Vec<NodeData>,
    pub index: HashMap<NodeId, NodeIdx>,
}

impl TreeInner {
    pub fn slot(&self, idx: NodeIdx) -> VitrineResult<&NodeData> {
        self.slots
            .get(idx)
            .ok_or_else(|| NodeError::invalid_state(format!("slot {} out of range", idx)).into())
    }

    pub fn slot_mut(&mut self, idx: NodeIdx) -> VitrineResult<&mut NodeData> {
        self.slots
            .get_mut(idx)
            .ok_or_else(|| NodeError::invalid_state(format!("slot {} out of range", idx)).into())
    }

    /// Append a slot, indexing it when it carries a persisted id.
    pub fn push(&mut self, data: NodeData) -> NodeIdx {
        let idx = self.slots.len();
        let id = data.id();
        self.slots.push(data);
        if id.is_persisted() {
            self.index.insert(id, idx);
        }
        idx
    }

    /// Place `data` into this tree. An existing slot for the same id keeps
    /// its links and takes the new data.
    pub fn adopt(&mut self, data: NodeData) -> NodeIdx {
        let id = data.id();
        if id.is_persisted() {
            if let Some(&idx) = self.index.get(&id) {
                let slot = &mut self.slots[idx];
                let (parent, children) = (slot.parent, std::mem::take(&mut slot.children));
                *slot = data;
                slot.parent = parent;
                slot.children = children;
                if !slot.children.is_empty() && slot.state == InflationState::Shallow {
                    slot.state = InflationState::Deep;
                }
                return idx;
            }
        }
        self.push(data)
    }

    /// Detach `child` from whichever container slot currently lists it.
    pub fn unlink(&mut self, child: NodeIdx) {
        if let Some(parent) = self.slots.get(child).and_then(|c| c.parent) {
            if let Some(slot) = self.slots.get_mut(parent) {
                slot.children.retain(|c| *c != child);
            }
        }
        if let Some(slot) = self.slots.get_mut(child) {
            slot.parent = None;
        }
    }

    /// Every slot below `idx` that is attached in this tree, depth first.
    pub fn descendants(&self, idx: NodeIdx) -> Vec<NodeIdx> {
        let mut found = Vec::new();
        let mut seen = HashSet::from([idx]);
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            if let Some(slot) = self.slots.get(current) {
                for child in slot.children.iter().rev() {
                    if seen.insert(*child) {
                        found.push(*child);
                        stack.push(*child);
                    }
                }
            }
        }
        found
    }
}

/// One materialized tree of nodes.
pub(crate) struct NodeTree {
    context: Weak<EngineContext>,
    writable: bool,
    inner: RwLock<TreeInner>,
}

impl fmt::Debug for NodeTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTree")
            .field("writable", &self.writable)
            .field("slots", &self.read_inner().slots.len())
            .finish()
    }
}

impl NodeTree {
    pub fn new(context: Weak<EngineContext>, writable: bool) -> Arc<Self> {
        Arc::new(Self {
            context,
            writable,
            inner: RwLock::new(TreeInner::default()),
        })
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// The engine this tree was loaded by, unless it has been shut down.
    pub fn context(&self) -> VitrineResult<Arc<EngineContext>> {
        let context = self
            .context
            .upgrade()
            .ok_or_else(|| NodeError::invalid_state("gallery engine has been dropped"))?;
        if context.is_shut_down() {
            return Err(NodeError::invalid_state("gallery engine has been shut down").into());
        }
        Ok(context)
    }

    // A panic while a slot is being written leaves that slot as last
    // written; readers carry on with it.
    pub fn read_inner(&self) -> RwLockReadGuard<'_, TreeInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write_inner(&self) -> RwLockWriteGuard<'_, TreeInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn read<R>(&self, idx: NodeIdx, f: impl FnOnce(&NodeData) -> R) -> VitrineResult<R> {
        let inner = self.read_inner();
        Ok(f(inner.slot(idx)?))
    }

    pub fn write<R>(&self, idx: NodeIdx, f: impl FnOnce(&mut NodeData) -> R) -> VitrineResult<R> {
        let mut inner = self.write_inner();
        Ok(f(inner.slot_mut(idx)?))
    }

    pub fn push(&self, data: NodeData) -> NodeIdx {
        self.write_inner().push(data)
    }

    pub fn lookup(&self, id: NodeId) -> Option<NodeIdx> {
        self.read_inner().index.get(&id).copied()
    }

    /// Register a slot under the id it was just assigned.
    pub fn reindex(&self, idx: NodeIdx, id: NodeId) {
        if id.is_persisted() {
            self.write_inner().index.insert(id, idx);
        }
    }

    /// Create `data` as a child of `parent` in this tree.
    pub fn insert_child(&self, parent: NodeIdx, mut data: NodeData) -> VitrineResult<NodeIdx> {
        let mut inner = self.write_inner();
        inner.slot(parent)?;
        data.parent = Some(parent);
        let idx = inner.push(data);
        inner.slot_mut(parent)?.children.push(idx);
        Ok(idx)
    }
}
