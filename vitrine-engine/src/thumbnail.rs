//! Container thumbnail assignment.
//!
//! A container's thumbnail is missing when it is unset, when the leaf it
//! names no longer exists, or when that leaf's thumbnail file is gone. A
//! missing thumbnail is replaced by the first saved leaf found depth first:
//! child leaves in order, then child containers in order, else
//! [`NodeId::NONE`].
//!
//! The in-memory value is updated before the store. The store is written
//! only when the computed id differs from the stored one, and then only the
//! thumbnail field is written.

use std::collections::HashSet;

use vitrine_core::{
    AssetSnapshot, NodeError, NodeId, NodeKind, NodeRecord, RenditionKind, VitrineResult,
};

use crate::context::EngineContext;
use crate::node::Node;
use crate::paths::{rendition_root, MAX_DEPTH};

/// How far a repair cascades from the container it starts at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairOptions {
    /// Walk up through every containing album.
    pub ancestors: bool,
    /// Recurse into every child album.
    pub descendants: bool,
}

impl RepairOptions {
    pub fn ancestors() -> Self {
        Self {
            ancestors: true,
            descendants: false,
        }
    }

    pub fn descendants() -> Self {
        Self {
            ancestors: false,
            descendants: true,
        }
    }
}

impl EngineContext {
    pub(crate) fn repair_thumbnail(&self, container: &Node, options: RepairOptions) -> VitrineResult<()> {
        self.repair_excluding(container, options, &HashSet::new())
    }

    /// Repair, also treating thumbnails that name any of `stale` as missing.
    pub(crate) fn repair_excluding(
        &self,
        container: &Node,
        options: RepairOptions,
        stale: &HashSet<NodeId>,
    ) -> VitrineResult<()> {
        if !container.is_container() {
            return Err(NodeError::invalid_state(format!(
                "node {} is not a container and has no thumbnail",
                container.id()
            ))
            .into());
        }
        container.require_writable()?;

        self.repair_one(container, stale)?;
        if options.descendants {
            self.repair_below(container, stale, 0)?;
        }
        if options.ancestors {
            let mut current = container.parent()?;
            let mut depth = 0;
            while let Some(node) = current {
                depth += 1;
                if depth > MAX_DEPTH {
                    break;
                }
                self.repair_one(&node, stale)?;
                current = node.parent()?;
            }
        }
        Ok(())
    }

    fn repair_below(&self, container: &Node, stale: &HashSet<NodeId>, depth: usize) -> VitrineResult<()> {
        if depth > MAX_DEPTH {
            return Ok(());
        }
        for child in container.child_containers()? {
            self.repair_one(&child, stale)?;
            self.repair_below(&child, stale, depth + 1)?;
        }
        Ok(())
    }

    /// Repair a single container. Returns whether its thumbnail changed.
    fn repair_one(&self, container: &Node, stale: &HashSet<NodeId>) -> VitrineResult<bool> {
        let current = container.thumbnail_id()?;
        if !stale.contains(&current) && !self.thumbnail_missing(current)? {
            return Ok(false);
        }

        let found = find_thumbnail(container, 0)?;
        if found != current {
            container.tree.write(container.idx, |d| {
                if let NodeRecord::Album(a) = &mut d.record {
                    a.thumbnail_id = found;
                }
            })?;
        }

        let id = container.id();
        if id.is_persisted() {
            if let Some(NodeRecord::Album(mut stored)) = self.store.node_get(id)? {
                if stored.thumbnail_id != found {
                    stored.thumbnail_id = found;
                    let parent_id = stored.parent_id;
                    self.store.node_save(&NodeRecord::Album(stored))?;
                    self.purge_after_write(id, &[parent_id], &[], false);
                    tracing::info!(id = %id, thumbnail = %found, "thumbnail repaired");
                    return Ok(true);
                }
            }
        }
        Ok(found != current)
    }

    /// Whether `thumbnail_id` fails to name a leaf with a thumbnail file.
    pub(crate) fn thumbnail_missing(&self, thumbnail_id: NodeId) -> VitrineResult<bool> {
        if !thumbnail_id.is_persisted() {
            return Ok(true);
        }
        let snapshot = match self.fetch_snapshot(thumbnail_id, Some(NodeKind::Leaf)) {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_not_found() => return Ok(true),
            Err(e) => return Err(e),
        };
        let AssetSnapshot::Leaf(leaf) = snapshot else {
            return Ok(true);
        };
        if !leaf.record.thumbnail.has_file() {
            return Ok(true);
        }

        let settings = self.settings(leaf.record.gallery_id)?;
        let dir = self.stored_relative_dir(leaf.record.album_id)?;
        let path = rendition_root(&settings, RenditionKind::Thumbnail)
            .join(dir)
            .join(&leaf.record.thumbnail.file_name);
        let exists = self.files.exists(&path);
        if !exists {
            tracing::debug!(id = %thumbnail_id, path = %path.display(), "thumbnail file missing");
        }
        Ok(!exists)
    }
}

/// First saved leaf below `container`, depth first.
pub(crate) fn find_thumbnail(container: &Node, depth: usize) -> VitrineResult<NodeId> {
    if depth > MAX_DEPTH {
        return Ok(NodeId::NONE);
    }
    let children = container.children()?;
    if let Some(leaf) = children.iter().find(|c| c.is_leaf() && !c.is_new()) {
        return Ok(leaf.id());
    }
    for child in children.iter().filter(|c| c.is_container()) {
        let found = find_thumbnail(child, depth + 1)?;
        if !found.is_none() {
            return Ok(found);
        }
    }
    Ok(NodeId::NONE)
}
