//! Tree mutations: save, delete, move, copy and sort.
//!
//! Every mutation writes the record store first and purges cache entries
//! only after the write succeeded. Nothing here is transactional: an I/O
//! failure part way through a recursive copy or sort leaves the operations
//! already performed in place.
//!
//! These functions assume the caller holds the engine's mutation lock and
//! never take it themselves.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use vitrine_core::{
    compute_hash_key, GalleryId, GallerySettings, MetadataKind, NodeError, NodeId, NodeKind, NodeRecord,
    RenditionKind, Timestamp, ValidationError, VitrineError, VitrineResult,
};

use crate::context::EngineContext;
use crate::events::DeletedEvent;
use crate::metadata::{file_stem, CommitMode, MetadataCollection};
use crate::node::Node;
use crate::paths::{
    directory_roots, rendition_root, unique_directory_name, unique_file_name, MAX_DEPTH,
};
use crate::thumbnail::RepairOptions;
use crate::tree::{InflationState, NodeData, NodeIdx, NodeTree, StoredLocation};

/// How [`Gallery::sort`](crate::Gallery::sort) orders and persists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortOptions {
    /// Save every child whose sequence changed.
    pub persist: bool,
    /// Also sort the children of every child album.
    pub recursive: bool,
    /// When recursing, give child albums this album's sort field and
    /// direction first.
    pub replace_child_sort_fields: bool,
    /// Recorded as the modifier of persisted children. Required to persist.
    pub username: Option<String>,
}

impl SortOptions {
    pub fn persisted(username: impl Into<String>) -> Self {
        Self {
            persist: true,
            username: Some(username.into()),
            ..Self::default()
        }
    }

    pub fn recursive(mut self, replace_child_sort_fields: bool) -> Self {
        self.recursive = true;
        self.replace_child_sort_fields = replace_child_sort_fields;
        self
    }
}

#[derive(Debug, Clone, PartialEq, PartialOrd)]
enum SortKey {
    Time(Timestamp),
    Number(f64),
    Text(String),
}

impl EngineContext {
    // ========================================================================
    // SAVE
    // ========================================================================

    pub(crate) fn save_node(&self, node: &Node, username: &str) -> VitrineResult<()> {
        self.save_with(node, username, true)
    }

    /// Persist `node`. `extract` controls metadata extraction for a node
    /// saved for the first time; copies carry their metadata over instead.
    pub(crate) fn save_with(&self, node: &Node, username: &str, extract: bool) -> VitrineResult<()> {
        node.require_writable()?;
        if node.is_virtual() {
            return Err(NodeError::invalid_state("a virtual container cannot be saved").into());
        }
        node.ensure_loaded()?;

        let was_new = node.is_new();
        let kind = node.kind();
        let gallery_id = node.gallery_id()?;
        let settings = self.settings(gallery_id)?;

        let parent = node.parent()?;
        if let Some(parent) = &parent {
            if parent.is_new() {
                return Err(NodeError::invalid_state(format!(
                    "the album containing {} has not been saved",
                    node.id()
                ))
                .into());
            }
        }
        let parent_id = parent.as_ref().map(Node::id);
        match (kind, parent_id) {
            (NodeKind::Leaf, None) => {
                return Err(ValidationError::RequiredFieldMissing {
                    field: "album_id".to_string(),
                }
                .into())
            }
            (NodeKind::Container, None) => self.check_root_unique(node, gallery_id)?,
            (_, Some(parent_id)) => {
                node.tree.write(node.idx, |d| d.set_parent_id(Some(parent_id)))?;
            }
        }

        if kind == NodeKind::Container {
            self.assign_directory_name(node, parent_id, &settings)?;
        }

        for observer in self.observers() {
            observer.before_save(node)?;
        }

        let now = Utc::now();
        node.tree.write(node.idx, |d| stamp_audit(d, username, now, was_new))?;

        if was_new && kind == NodeKind::Leaf {
            node.tree.write(node.idx, prepare_new_leaf)?;
        }
        if was_new && extract {
            let mode = match kind {
                NodeKind::Leaf => CommitMode::Full,
                NodeKind::Container => CommitMode::Routine,
            };
            self.build_metadata(node, mode)?;
        }

        let stored_before = node.tree.read(node.idx, |d| d.stored.clone())?;
        let record = node.record()?;
        let saved = self.store.node_save(&record)?;
        let id = saved.id();

        let children = node.tree.write(node.idx, |d| {
            d.record = saved;
            if d.state == InflationState::New {
                // Everything below a container saved for the first time is
                // already attached in memory.
                d.state = match kind {
                    NodeKind::Container => InflationState::Deep,
                    NodeKind::Leaf => InflationState::Shallow,
                };
            }
            d.dirty = false;
            d.children.clone()
        })?;
        node.tree.reindex(node.idx, id);
        if was_new {
            for child in children {
                node.tree.write(child, |d| {
                    if d.parent == Some(node.idx) {
                        d.set_parent_id(Some(id));
                    }
                })?;
            }
        }

        self.persist_metadata(node, id)?;

        let current = node.tree.read(node.idx, |d| d.location())?;
        match &stored_before {
            None if kind == NodeKind::Container => self.create_directories(node, &settings)?,
            Some(old) if *old != current => self.relocate(node, old, &settings)?,
            _ => {}
        }
        node.tree.write(node.idx, |d| d.stored = Some(current.clone()))?;

        let old_parent = stored_before.as_ref().and_then(|s| s.parent_id);
        let membership_changed = was_new || old_parent != current.parent_id;
        let (containers, leaves) = self.known_descendants(node);
        let below: Vec<NodeId> = containers.into_iter().chain(leaves).collect();
        self.purge_after_write(id, &[old_parent, current.parent_id], &below, membership_changed);

        if was_new && kind == NodeKind::Leaf {
            if let Some(parent) = &parent {
                self.repair_thumbnail(parent, RepairOptions::default())?;
            }
        }

        for observer in self.observers() {
            observer.saved(node);
        }
        tracing::info!(id = %id, kind = %kind, new = was_new, "node saved");
        Ok(())
    }

    fn check_root_unique(&self, node: &Node, gallery_id: GalleryId) -> VitrineResult<()> {
        if let Some(root) = self.store.root_album(gallery_id)? {
            if root.id != node.id() {
                return Err(ValidationError::InvalidValue {
                    field: "parent_id".to_string(),
                    reason: format!("gallery {} already has root album {}", gallery_id, root.id),
                }
                .into());
            }
        }
        node.tree.write(node.idx, |d| {
            if let NodeRecord::Album(a) = &mut d.record {
                a.directory_name.clear();
            }
        })
    }

    /// Derive a directory name from the title when unset, then make it
    /// unique among the stored siblings.
    fn assign_directory_name(
        &self,
        node: &Node,
        parent_id: Option<NodeId>,
        settings: &GallerySettings,
    ) -> VitrineResult<()> {
        let Some(parent_id) = parent_id else {
            return Ok(());
        };
        let id = node.id();
        let (current, title) = node.tree.read(node.idx, |d| match &d.record {
            NodeRecord::Album(a) => (a.directory_name.clone(), a.title.clone()),
            NodeRecord::Media(_) => (String::new(), String::new()),
        })?;
        let base = if current.is_empty() { title } else { current.clone() };

        let taken: Vec<String> = self
            .store
            .node_children(parent_id)?
            .into_iter()
            .filter_map(|r| match r {
                NodeRecord::Album(a) if a.id != id => Some(a.directory_name),
                _ => None,
            })
            .collect();
        let name = unique_directory_name(&base, &taken, settings.max_directory_name_length);
        if name != current {
            tracing::debug!(id = %id, from = %current, to = %name, "directory name assigned");
            node.tree.write(node.idx, |d| {
                if let NodeRecord::Album(a) = &mut d.record {
                    a.directory_name = name;
                }
            })?;
        }
        Ok(())
    }

    /// Write pending metadata under `id` and reload the stored items.
    fn persist_metadata(&self, node: &Node, id: NodeId) -> VitrineResult<()> {
        let pending = node.tree.read(node.idx, |d| d.metadata.pending())?;
        if pending.is_empty() {
            return Ok(());
        }
        for item in pending {
            if item.is_deleted {
                if item.record.id != 0 {
                    self.store.metadata_delete(item.record.id)?;
                }
                continue;
            }
            let mut record = item.record;
            record.node_id = id;
            self.store.metadata_save(&record)?;
        }
        let stored = self.store.metadata_list(id)?;
        node.tree
            .write(node.idx, |d| d.metadata = MetadataCollection::from_records(stored))
    }

    fn create_directories(&self, node: &Node, settings: &GallerySettings) -> VitrineResult<()> {
        let dir = node.relative_dir()?;
        for root in directory_roots(settings) {
            self.files.create_directory(&root.join(&dir))?;
        }
        Ok(())
    }

    /// Move files so they follow a changed parent or name.
    fn relocate(&self, node: &Node, old: &StoredLocation, settings: &GallerySettings) -> VitrineResult<()> {
        let old_dir = match old.parent_id.filter(|id| id.is_persisted()) {
            Some(parent_id) => self.stored_relative_dir(parent_id)?,
            None => PathBuf::new(),
        };
        let new_dir = node.relative_dir()?;

        match node.kind() {
            NodeKind::Container => {
                let from_rel = old_dir.join(&old.name);
                for root in directory_roots(settings) {
                    let (from, to) = (root.join(&from_rel), root.join(&new_dir));
                    if from == to {
                        continue;
                    }
                    if self.files.exists(&from) {
                        self.files.move_directory(&from, &to)?;
                    } else {
                        tracing::warn!(id = %node.id(), path = %from.display(), "directory to move is missing");
                    }
                }
            }
            NodeKind::Leaf => {
                for kind in RenditionKind::ALL {
                    let rendition = node.rendition(kind)?;
                    if !rendition.has_file() {
                        continue;
                    }
                    let old_name = match kind {
                        RenditionKind::Original if !old.name.is_empty() => old.name.as_str(),
                        _ => rendition.file_name.as_str(),
                    };
                    let root = rendition_root(settings, kind);
                    let from = root.join(&old_dir).join(old_name);
                    let to = root.join(&new_dir).join(&rendition.file_name);
                    if from == to {
                        continue;
                    }
                    if self.files.exists(&from) {
                        self.files.move_file(&from, &to)?;
                    } else {
                        tracing::warn!(id = %node.id(), path = %from.display(), "file to move is missing");
                    }
                }
            }
        }
        tracing::debug!(id = %node.id(), to = %new_dir.display(), "files relocated");
        Ok(())
    }

    /// Cache purge after a confirmed write to `id`.
    ///
    /// Drops `id` from every tier, the listed parents from every tier (their
    /// child lists may have changed), the inflated trees of their ancestors
    /// and of `descendants`, any other inflated tree that already resolved
    /// `id` or a listed parent, and the membership aggregates when a
    /// container's membership changed.
    pub(crate) fn purge_after_write(
        &self,
        id: NodeId,
        parents: &[Option<NodeId>],
        descendants: &[NodeId],
        membership_changed: bool,
    ) {
        let parents: Vec<NodeId> = parents
            .iter()
            .flatten()
            .copied()
            .filter(|p| p.is_persisted())
            .collect();
        let mut ancestors: Vec<NodeId> = Vec::new();
        for parent in &parents {
            for ancestor in self.ancestor_ids(Some(*parent)) {
                if !ancestors.contains(&ancestor) {
                    ancestors.push(ancestor);
                }
            }
        }

        self.caches.invalidate(id);
        self.caches.invalidate_many(&parents);
        let mut written = Vec::with_capacity(parents.len() + 1);
        written.push(id);
        written.extend(parents.iter().copied());
        let evicted = self.caches.evict_inflated(&ancestors)
            + self.caches.evict_inflated(descendants)
            + self.caches.evict_embedding(&written);
        if membership_changed {
            self.purge_membership_aggregates();
        }
        tracing::debug!(id = %id, parents = parents.len(), evicted, membership_changed, "caches purged");
    }

    // ========================================================================
    // DELETE
    // ========================================================================

    pub(crate) fn delete_node(&self, node: &Node, keep_files: bool) -> VitrineResult<DeletedEvent> {
        node.require_writable()?;
        if node.is_virtual() {
            return Err(NodeError::invalid_state("a virtual container cannot be deleted").into());
        }
        node.ensure_loaded()?;

        let id = node.id();
        let kind = node.kind();
        let parent = node.parent()?;
        if node.is_new() {
            node.tree.write_inner().unlink(node.idx);
            return Ok(DeletedEvent {
                id,
                kind,
                parent_id: parent.as_ref().map(Node::id),
                container_ids: Vec::new(),
                leaf_ids: Vec::new(),
            });
        }
        if kind == NodeKind::Container && node.parent_id()?.is_none() {
            return Err(NodeError::invalid_state("the root album cannot be deleted").into());
        }

        let (container_ids, leaf_ids) = self.known_descendants(node);
        let parent_id = node.parent_id()?.filter(|p| p.is_persisted());
        let paths = if keep_files {
            Vec::new()
        } else {
            let settings = self.settings(node.gallery_id()?)?;
            self.deletion_paths(node, &settings)?
        };
        let ancestors = self.ancestor_ids(parent_id);

        let removed = self.store.node_delete(id)?;

        let mut failure: Option<VitrineError> = None;
        for (path, is_dir) in &paths {
            if !self.files.exists(path) {
                continue;
            }
            let result = if *is_dir {
                self.files.delete_directory(path)
            } else {
                self.files.delete_file(path)
            };
            if let Err(e) = result {
                tracing::error!(id = %id, path = %path.display(), error = %e, "file delete failed");
                failure.get_or_insert(e);
            }
        }

        node.tree.write_inner().unlink(node.idx);

        let mut evict: HashSet<NodeId> = removed.into_iter().collect();
        evict.insert(id);
        evict.extend(container_ids.iter().copied());
        evict.extend(leaf_ids.iter().copied());
        let evict: Vec<NodeId> = evict.into_iter().collect();
        self.caches.invalidate_many(&evict);
        if let Some(parent_id) = parent_id {
            self.caches.invalidate(parent_id);
        }
        self.caches.evict_inflated(&ancestors);
        self.caches.evict_embedding(&evict);
        self.purge_membership_aggregates();

        let event = DeletedEvent {
            id,
            kind,
            parent_id,
            container_ids,
            leaf_ids,
        };
        for observer in self.observers() {
            observer.deleted(&event);
        }
        tracing::info!(id = %id, kind = %kind, removed = evict.len(), keep_files, "node deleted");

        if let Some(parent) = parent.filter(|p| p.is_writable()) {
            let stale: HashSet<NodeId> = evict.iter().copied().collect();
            if stale.contains(&parent.thumbnail_id()?) {
                self.repair_excluding(&parent, RepairOptions::default(), &stale)?;
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(event),
        }
    }

    /// Files and directories owned by `node`, as the store currently places
    /// them. `true` marks a directory.
    fn deletion_paths(&self, node: &Node, settings: &GallerySettings) -> VitrineResult<Vec<(PathBuf, bool)>> {
        let mut paths = Vec::new();
        match node.kind() {
            NodeKind::Container => {
                let dir = self.stored_relative_dir(node.id())?;
                for root in directory_roots(settings) {
                    paths.push((root.join(&dir), true));
                }
            }
            NodeKind::Leaf => {
                let album_id = node.parent_id()?.unwrap_or(NodeId::NONE);
                let dir = if album_id.is_persisted() {
                    self.stored_relative_dir(album_id)?
                } else {
                    PathBuf::new()
                };
                for kind in RenditionKind::ALL {
                    let rendition = node.rendition(kind)?;
                    if rendition.has_file() {
                        let path = rendition_root(settings, kind).join(&dir).join(&rendition.file_name);
                        if !paths.iter().any(|(p, _)| *p == path) {
                            paths.push((path, false));
                        }
                    }
                }
            }
        }
        Ok(paths)
    }

    // ========================================================================
    // MOVE
    // ========================================================================

    /// `node` itself when `id` is in its tree, otherwise a fresh writable load.
    fn writable_in_tree_of(self: &Arc<Self>, node: &Node, id: NodeId) -> VitrineResult<Node> {
        match node.tree.lookup(id) {
            Some(idx) if node.tree.is_writable() => Ok(Node::new(node.tree.clone(), idx)),
            _ => self.load_node(id, true, Some(NodeKind::Container)),
        }
    }

    fn check_destination(&self, node: &Node, destination: &Node) -> VitrineResult<()> {
        if node.is_virtual() || destination.is_virtual() {
            return Err(NodeError::invalid_state("virtual containers cannot take part in a move or copy").into());
        }
        if node.is_new() {
            return Err(NodeError::invalid_state(format!("{} must be saved first", node.kind())).into());
        }
        if !destination.is_container() || !destination.id().is_persisted() {
            return Err(NodeError::invalid_state(format!(
                "destination {} is not a saved album",
                destination.id()
            ))
            .into());
        }
        if node.is_container() && destination.is_within(node)? {
            return Err(ValidationError::CircularReference {
                id: node.id(),
                destination: destination.id(),
            }
            .into());
        }
        Ok(())
    }

    pub(crate) fn move_node(self: &Arc<Self>, node: &Node, destination: &Node, username: &str) -> VitrineResult<()> {
        node.require_writable()?;
        node.ensure_loaded()?;
        destination.ensure_loaded()?;
        self.check_destination(node, destination)?;

        let old_parent_id = node.parent_id()?;
        if node.is_container() && old_parent_id.is_none() {
            return Err(NodeError::invalid_state("the root album cannot be moved").into());
        }
        let destination_id = destination.id();
        if old_parent_id == Some(destination_id) {
            return Ok(());
        }

        let old_chain = self.ancestor_ids(old_parent_id);
        let (_, moved_leaves) = self.known_descendants(node);
        let mut stale: HashSet<NodeId> = moved_leaves.iter().copied().collect();
        stale.insert(node.id());

        if Arc::ptr_eq(&node.tree, &destination.tree) {
            destination.add_child(node)?;
        } else {
            node.tree.write_inner().unlink(node.idx);
            node.tree.write(node.idx, |d| {
                d.set_parent_id(Some(destination_id));
                d.dirty = true;
            })?;
        }

        let mut privatized = Vec::new();
        if destination.is_private()? && !node.is_private()? {
            node.set_private(true)?;
        }
        if destination.is_private()? && node.is_container() {
            collect_private(node, &mut privatized, 0)?;
        }

        self.save_with(node, username, false)?;
        for descendant in &privatized {
            self.save_with(descendant, username, false)?;
        }

        for id in &old_chain {
            let ancestor = self.writable_in_tree_of(node, *id)?;
            self.repair_excluding(&ancestor, RepairOptions::default(), &stale)?;
        }
        let target = self.writable_in_tree_of(node, destination_id)?;
        self.repair_thumbnail(&target, RepairOptions::ancestors())?;

        tracing::info!(
            id = %node.id(),
            from = ?old_parent_id,
            to = %destination_id,
            private_descendants = privatized.len(),
            "node moved"
        );
        Ok(())
    }

    // ========================================================================
    // COPY
    // ========================================================================

    pub(crate) fn copy_node(
        self: &Arc<Self>,
        source: &Node,
        destination: &Node,
        username: &str,
    ) -> VitrineResult<Node> {
        source.ensure_loaded()?;
        destination.ensure_loaded()?;
        self.check_destination(source, destination)?;

        let destination_id = destination.id();
        let gallery_id = destination.gallery_id()?;
        let settings = self.settings(gallery_id)?;
        let private = destination.is_private()?;

        let tree = NodeTree::new(Arc::downgrade(self), true);
        let anchor = tree.push(NodeData::stub(destination_id, NodeKind::Container, gallery_id));
        let mut copied_leaves = HashMap::new();
        let copy = self.copy_into(
            &tree,
            anchor,
            source,
            &CopyContext {
                username,
                settings: &settings,
                private,
            },
            &mut copied_leaves,
            0,
        )?;

        tracing::info!(
            source = %source.id(),
            copy = %copy.id(),
            to = %destination_id,
            leaves = copied_leaves.len(),
            "node copied"
        );
        Ok(copy)
    }

    fn copy_into(
        &self,
        tree: &Arc<NodeTree>,
        parent: NodeIdx,
        source: &Node,
        ctx: &CopyContext<'_>,
        copied_leaves: &mut HashMap<NodeId, NodeId>,
        depth: usize,
    ) -> VitrineResult<Node> {
        if depth > MAX_DEPTH {
            return Err(ValidationError::CircularReference {
                id: source.id(),
                destination: source.id(),
            }
            .into());
        }
        source.ensure_loaded()?;
        let parent_id = tree.read(parent, |d| d.id())?;
        let now = Utc::now();

        let mut data = source.tree.read(source.idx, NodeData::detached)?;
        data.record.set_id(NodeId::NEW);
        data.set_parent_id(Some(parent_id));
        data.metadata = data.metadata.duplicated();
        data.state = InflationState::New;
        data.dirty = true;
        data.stored = None;
        match &mut data.record {
            NodeRecord::Album(a) => {
                a.owned_by.clear();
                a.owner_role_name.clear();
                a.thumbnail_id = NodeId::NONE;
                a.date_added = now;
            }
            NodeRecord::Media(m) => m.date_added = now,
        }
        if ctx.private {
            data.set_private(true);
        }

        let idx = tree.insert_child(parent, data)?;
        let copy = Node::new(tree.clone(), idx);

        if copy.is_leaf() {
            self.assign_unique_file_names(&copy, parent_id)?;
        }
        self.save_with(&copy, ctx.username, false)?;
        let copy_id = copy.id();

        match copy.kind() {
            NodeKind::Leaf => self.copy_files(source, &copy, ctx.settings)?,
            NodeKind::Container => {
                self.copy_explicit_roles(source.id(), copy_id, copy.gallery_id()?)?;
                for child in source.children()? {
                    let child_copy =
                        self.copy_into(tree, idx, &child, ctx, copied_leaves, depth + 1)?;
                    if child.is_leaf() {
                        copied_leaves.insert(child.id(), child_copy.id());
                    }
                }
                let source_thumbnail = source.thumbnail_id()?;
                match copied_leaves.get(&source_thumbnail) {
                    Some(new_thumbnail) => self.point_thumbnail(&copy, *new_thumbnail)?,
                    None => self.repair_thumbnail(&copy, RepairOptions::default())?,
                }
            }
        }
        Ok(copy)
    }

    /// Rename a leaf's rendition files so none collides in the album.
    fn assign_unique_file_names(&self, copy: &Node, album_id: NodeId) -> VitrineResult<()> {
        let siblings: Vec<NodeRecord> = self.store.node_children(album_id)?;
        for kind in RenditionKind::ALL {
            let mut rendition = copy.rendition(kind)?;
            if !rendition.has_file() {
                continue;
            }
            let taken: HashSet<String> = siblings
                .iter()
                .filter_map(|r| match r {
                    NodeRecord::Media(m) => Some(match kind {
                        RenditionKind::Thumbnail => m.thumbnail.file_name.to_lowercase(),
                        RenditionKind::Optimized => m.optimized.file_name.to_lowercase(),
                        RenditionKind::Original => m.original.file_name.to_lowercase(),
                    }),
                    NodeRecord::Album(_) => None,
                })
                .collect();
            let name = unique_file_name(&rendition.file_name, &taken);
            if name != rendition.file_name {
                rendition.file_name = name;
                copy.set_rendition(kind, rendition)?;
            }
        }
        Ok(())
    }

    fn copy_files(&self, source: &Node, copy: &Node, settings: &GallerySettings) -> VitrineResult<()> {
        for kind in RenditionKind::ALL {
            let from = source.rendition_path_with(settings, kind)?;
            let to = copy.rendition_path_with(settings, kind)?;
            if let (Some(from), Some(to)) = (from, to) {
                if self.files.exists(&from) {
                    self.files.copy_file(&from, &to)?;
                } else {
                    tracing::warn!(id = %source.id(), path = %from.display(), "file to copy is missing");
                }
            }
        }
        Ok(())
    }

    /// Give the copy every role assigned explicitly to the source, unless
    /// the copy already inherits it.
    fn copy_explicit_roles(&self, source_id: NodeId, copy_id: NodeId, gallery_id: GalleryId) -> VitrineResult<()> {
        let inherited_from = self.ancestor_ids(Some(copy_id));
        let roles = self.roles(gallery_id)?;
        let mut copied = 0usize;
        for role in roles.iter().filter(|r| r.is_assigned_to(source_id)) {
            if inherited_from.iter().any(|a| role.is_assigned_to(*a)) {
                continue;
            }
            let mut role = role.clone();
            role.album_ids.push(copy_id);
            self.store.role_save(&role)?;
            copied += 1;
        }
        if copied > 0 {
            self.caches.aggregates().purge_roles();
            tracing::debug!(source = %source_id, copy = %copy_id, copied, "roles copied");
        }
        Ok(())
    }

    /// Set a container's thumbnail in memory and in the store.
    fn point_thumbnail(&self, container: &Node, thumbnail_id: NodeId) -> VitrineResult<()> {
        container.tree.write(container.idx, |d| {
            if let NodeRecord::Album(a) = &mut d.record {
                a.thumbnail_id = thumbnail_id;
            }
        })?;
        let id = container.id();
        if let Some(NodeRecord::Album(mut stored)) = self.store.node_get(id)? {
            if stored.thumbnail_id != thumbnail_id {
                stored.thumbnail_id = thumbnail_id;
                let parent_id = stored.parent_id;
                self.store.node_save(&NodeRecord::Album(stored))?;
                self.purge_after_write(id, &[parent_id], &[], false);
            }
        }
        Ok(())
    }

    // ========================================================================
    // SORT
    // ========================================================================

    pub(crate) fn sort_node(&self, node: &Node, options: &SortOptions) -> VitrineResult<()> {
        if !node.is_container() {
            return Err(NodeError::invalid_state(format!("node {} is not an album", node.id())).into());
        }
        node.require_writable()?;
        let username = match (&options.username, options.persist) {
            (Some(name), _) if !name.trim().is_empty() => name.trim().to_string(),
            (_, true) => {
                return Err(NodeError::invalid_state("a username is required to persist a sort").into())
            }
            _ => String::new(),
        };
        let (sort_by, ascending) = (node.sort_by()?, node.sort_ascending()?);
        self.sort_children(node, sort_by, ascending, options, &username, 0)
    }

    fn sort_children(
        &self,
        node: &Node,
        sort_by: MetadataKind,
        ascending: bool,
        options: &SortOptions,
        username: &str,
        depth: usize,
    ) -> VitrineResult<()> {
        if depth > MAX_DEPTH {
            return Ok(());
        }
        let mut keyed = Vec::new();
        for child in node.children()? {
            let key = sort_key(&child, sort_by)?;
            keyed.push((key, child.sequence()?, child.id(), child));
        }
        keyed.sort_by(|a, b| {
            let by_key = a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal);
            let by_key = if ascending { by_key } else { by_key.reverse() };
            by_key.then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2))
        });

        let mut changed = Vec::new();
        for (position, (_, old_sequence, _, child)) in keyed.iter().enumerate() {
            let sequence = position as i32 + 1;
            if *old_sequence != sequence {
                child.set_sequence(sequence)?;
                changed.push(child.clone());
            }
        }
        let order: Vec<NodeIdx> = keyed.iter().map(|(_, _, _, c)| c.idx).collect();
        node.tree.write(node.idx, |d| d.children = order)?;

        if options.persist {
            for child in changed.iter().filter(|c| !c.is_new()) {
                self.save_with(child, username, false)?;
            }
        }
        tracing::info!(id = %node.id(), sort_by = %sort_by, ascending, changed = changed.len(), "children sorted");

        if options.recursive {
            for (_, _, _, child) in keyed.iter().filter(|(_, _, _, c)| c.is_container()) {
                let (child_sort, child_ascending) = if options.replace_child_sort_fields {
                    if child.sort_by()? != sort_by || child.sort_ascending()? != ascending {
                        child.set_sort(sort_by, ascending)?;
                        if options.persist && !child.is_new() {
                            self.save_with(child, username, false)?;
                        }
                    }
                    (sort_by, ascending)
                } else {
                    (child.sort_by()?, child.sort_ascending()?)
                };
                self.sort_children(child, child_sort, child_ascending, options, username, depth + 1)?;
            }
        }
        Ok(())
    }
}

struct CopyContext<'a> {
    username: &'a str,
    settings: &'a GallerySettings,
    private: bool,
}

fn stamp_audit(d: &mut NodeData, username: &str, now: Timestamp, was_new: bool) {
    let (created_by, date_added, modified_by, date_modified) = match &mut d.record {
        NodeRecord::Album(a) => (
            &mut a.created_by,
            &mut a.date_added,
            &mut a.last_modified_by,
            &mut a.date_last_modified,
        ),
        NodeRecord::Media(m) => (
            &mut m.created_by,
            &mut m.date_added,
            &mut m.last_modified_by,
            &mut m.date_last_modified,
        ),
    };
    if was_new {
        *created_by = username.to_string();
        *date_added = now;
    }
    *modified_by = username.to_string();
    *date_modified = now;
}

/// Default the title to the file stem and compute the hash key.
fn prepare_new_leaf(d: &mut NodeData) {
    let NodeRecord::Media(m) = &d.record else {
        return;
    };
    let file_name = m.original.file_name.clone();
    let needs_title = m.title.trim().is_empty();
    if needs_title && !file_name.is_empty() {
        d.set_title(file_stem(&file_name));
    }
    if let NodeRecord::Media(m) = &mut d.record {
        m.hash_key = compute_hash_key(&m.original.file_name, m.original.size_kb, m.date_added);
    }
    if !file_name.is_empty() {
        d.metadata.set(MetadataKind::FileName, &file_name, None);
    }
}

/// Mark every descendant of `node` private, collecting those that changed.
fn collect_private(node: &Node, changed: &mut Vec<Node>, depth: usize) -> VitrineResult<()> {
    if depth > MAX_DEPTH {
        return Ok(());
    }
    for child in node.children()? {
        if !child.is_private()? {
            child.set_private(true)?;
            changed.push(child.clone());
        }
        if child.is_container() {
            collect_private(&child, changed, depth + 1)?;
        }
    }
    Ok(())
}

fn sort_key(node: &Node, sort_by: MetadataKind) -> VitrineResult<SortKey> {
    Ok(match sort_by {
        MetadataKind::DateAdded => SortKey::Time(node.audit()?.date_added),
        MetadataKind::FileSizeKb
        | MetadataKind::Width
        | MetadataKind::Height
        | MetadataKind::Rating
        | MetadataKind::Duration => {
            let value = node.metadata_value(sort_by)?.unwrap_or_default();
            SortKey::Number(leading_number(&value).unwrap_or(f64::NEG_INFINITY))
        }
        MetadataKind::Title => SortKey::Text(node.title()?.to_lowercase()),
        _ => SortKey::Text(node.metadata_value(sort_by)?.unwrap_or_default().to_lowercase()),
    })
}

/// `"2100 KB"` → `2100.0`.
fn leading_number(value: &str) -> Option<f64> {
    let end = value
        .trim()
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || (*i == 0 && *c == '-')))
        .map(|(i, _)| i)
        .unwrap_or(value.trim().len());
    value.trim()[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_leading_number() {
        assert_eq!(leading_number("2100 KB"), Some(2100.0));
        assert_eq!(leading_number(" 4.5 stars"), Some(4.5));
        assert_eq!(leading_number("-3"), Some(-3.0));
        assert_eq!(leading_number("n/a"), None);
        assert_eq!(leading_number(""), None);
    }

    #[test]
    fn test_sort_key_ordering() {
        let early = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).single();
        let late = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).single();
        if let (Some(early), Some(late)) = (early, late) {
            assert!(SortKey::Time(early) < SortKey::Time(late));
        }
        assert!(SortKey::Number(2.0) < SortKey::Number(10.0));
        assert!(SortKey::Text("apple".into()) < SortKey::Text("banana".into()));
    }

    #[test]
    fn test_sort_options_builders() {
        let options = SortOptions::persisted("admin").recursive(true);
        assert!(options.persist);
        assert!(options.recursive);
        assert!(options.replace_child_sort_fields);
        assert_eq!(options.username.as_deref(), Some("admin"));
        assert_eq!(SortOptions::default().username, None);
    }

    #[test]
    fn test_stamp_audit_sets_creator_only_when_new() {
        let mut data = NodeData::new_container(1, None);
        let now = Utc::now();
        stamp_audit(&mut data, "ann", now, true);
        stamp_audit(&mut data, "bob", now, false);
        match &data.record {
            NodeRecord::Album(a) => {
                assert_eq!(a.created_by, "ann");
                assert_eq!(a.last_modified_by, "bob");
            }
            NodeRecord::Media(_) => panic!("expected an album"),
        }
    }

    #[test]
    fn test_prepare_new_leaf_defaults_title_and_hash() {
        let mut data = NodeData::new_leaf(1, NodeId::new(1), "Image", "sunset.jpg");
        prepare_new_leaf(&mut data);
        assert_eq!(data.title(), "sunset");
        assert_eq!(data.metadata.value(MetadataKind::FileName), Some("sunset.jpg"));
        match &data.record {
            NodeRecord::Media(m) => assert_eq!(m.hash_key.len(), 64),
            NodeRecord::Album(_) => panic!("expected a media record"),
        }
    }
}
