//! Three-tier loading and lazy inflation.
//!
//! Resolution order for an id: inflated tier (read-only loads only) → asset
//! or leaf snapshot tier → record store. A store hit populates the snapshot
//! tier; a read-only load also populates the inflated tier. Writable loads
//! never touch the inflated tier.

use std::collections::BTreeSet;
use std::sync::Arc;

use vitrine_core::{
    AssetSnapshot, ChildIds, ContainerSnapshot, LeafSnapshot, NodeError, NodeId, NodeKind,
    NodeRecord, VitrineResult,
};

use crate::context::EngineContext;
use crate::node::Node;
use crate::paths::MAX_DEPTH;
use crate::tree::{InflationState, NodeData, NodeTree};

impl EngineContext {
    /// Snapshot of `id` from the snapshot tiers, or from the store.
    ///
    /// `expected` restricts the lookup to one kind; an id that resolves to
    /// the other kind is reported as not found.
    pub(crate) fn fetch_snapshot(
        &self,
        id: NodeId,
        expected: Option<NodeKind>,
    ) -> VitrineResult<AssetSnapshot> {
        let kinds: &[NodeKind] = match expected {
            Some(NodeKind::Container) => &[NodeKind::Container],
            Some(NodeKind::Leaf) => &[NodeKind::Leaf],
            None => &[NodeKind::Container, NodeKind::Leaf],
        };
        for kind in kinds {
            if let Some(snapshot) = self.caches.get_asset(*kind, id) {
                return Ok(snapshot);
            }
        }

        let record = self
            .store
            .node_get(id)?
            .ok_or(NodeError::NotFound { id, expected })?;
        if expected.is_some_and(|kind| kind != record.kind()) {
            return Err(NodeError::NotFound { id, expected }.into());
        }
        let snapshot = self.snapshot_from_record(record, None)?;
        self.caches.put_asset(&snapshot);
        tracing::debug!(id = %id, kind = %snapshot.kind(), "snapshot loaded from store");
        Ok(snapshot)
    }

    /// Build a snapshot from a store row plus its metadata rows.
    fn snapshot_from_record(
        &self,
        record: NodeRecord,
        children: Option<ChildIds>,
    ) -> VitrineResult<AssetSnapshot> {
        let id = record.id();
        let metadata = self.store.metadata_list(id)?;
        Ok(match record {
            NodeRecord::Album(record) => AssetSnapshot::Container(ContainerSnapshot {
                record,
                metadata,
                children,
            }),
            NodeRecord::Media(record) => {
                record
                    .leaf_kind()
                    .map_err(|e| NodeError::UnsupportedKind { id, discriminator: e.0 })?;
                AssetSnapshot::Leaf(LeafSnapshot { record, metadata })
            }
        })
    }

    /// Materialize `id` as the root slot of a new tree.
    pub(crate) fn load_node(
        self: &Arc<Self>,
        id: NodeId,
        writable: bool,
        expected: Option<NodeKind>,
    ) -> VitrineResult<Node> {
        self.ensure_running()?;
        if !id.is_persisted() {
            return Err(NodeError::NotFound { id, expected }.into());
        }

        if !writable {
            if let Some(node) = self.caches.get_inflated(id) {
                if expected.is_some_and(|kind| kind != node.kind()) {
                    return Err(NodeError::NotFound { id, expected }.into());
                }
                tracing::trace!(id = %id, "inflated hit");
                return Ok(node);
            }
        }

        let snapshot = self.fetch_snapshot(id, expected)?;
        let tree = NodeTree::new(Arc::downgrade(self), writable);
        let idx = tree.push(NodeData::from_snapshot(&snapshot));
        let node = Node::new(tree, idx);

        if !writable {
            self.caches.put_inflated(&node);
        }
        tracing::debug!(id = %id, kind = %snapshot.kind(), writable, "node loaded");
        Ok(node)
    }

    /// Fill a stub slot with its scalar fields and metadata.
    pub(crate) fn inflate_stub(&self, node: &Node) -> VitrineResult<()> {
        let _guard = Self::lock(&self.locks.inflation)?;
        // Another thread may have filled it while we waited.
        if node.state() != InflationState::Stub {
            return Ok(());
        }
        let snapshot = self.fetch_snapshot(node.id(), Some(node.kind()))?;
        node.tree.write(node.idx, |d| d.fill(&snapshot))?;
        tracing::trace!(id = %node.id(), "stub inflated");
        Ok(())
    }

    /// Attach the stored children of a container.
    ///
    /// Child ids come from the container's asset snapshot when it carries
    /// them, otherwise from the store (which then refreshes the snapshot). A
    /// child id that no longer resolves is logged and skipped. Children that
    /// are already attached are never attached twice.
    pub(crate) fn inflate_children(&self, node: &Node) -> VitrineResult<()> {
        let _guard = Self::lock(&self.locks.inflation)?;
        let (state, id, dirty) = node.tree.read(node.idx, |d| (d.state, d.id(), d.dirty))?;
        match state {
            InflationState::Deep => return Ok(()),
            InflationState::New => return Ok(()),
            InflationState::Stub => {
                let snapshot = self.fetch_snapshot(id, Some(NodeKind::Container))?;
                node.tree.write(node.idx, |d| d.fill(&snapshot))?;
            }
            InflationState::Shallow => {}
        }

        let cached_ids = self
            .caches
            .get_asset(NodeKind::Container, id)
            .and_then(|s| s.children().cloned());

        let snapshots = match cached_ids {
            Some(ids) => self.hydrate_child_ids(id, &ids)?,
            None => {
                let records = self.store.node_children(id)?;
                let mut ids = ChildIds::default();
                let mut snapshots = Vec::with_capacity(records.len());
                for record in records {
                    match record.kind() {
                        NodeKind::Container => ids.containers.push(record.id()),
                        NodeKind::Leaf => ids.leaves.push(record.id()),
                    }
                    let snapshot = self.snapshot_from_record(record, None)?;
                    self.caches.put_asset(&snapshot);
                    snapshots.push(snapshot);
                }
                if !dirty {
                    self.remember_child_ids(node, ids)?;
                }
                snapshots
            }
        };

        let attached = snapshots.len();
        {
            let mut inner = node.tree.write_inner();
            for snapshot in &snapshots {
                let child_id = snapshot.id();
                let already = inner.slot(node.idx)?.children.iter().any(|c| {
                    inner.slots.get(*c).is_some_and(|s| s.id() == child_id)
                });
                if already {
                    continue;
                }
                let child_idx = match inner.index.get(&child_id).copied() {
                    Some(existing) => {
                        if let Some(slot) = inner.slots.get_mut(existing) {
                            if slot.state == InflationState::Stub {
                                slot.fill(snapshot);
                            }
                        }
                        existing
                    }
                    None => inner.push(NodeData::from_snapshot(snapshot)),
                };
                inner.unlink(child_idx);
                inner.slot_mut(child_idx)?.parent = Some(node.idx);
                inner.slot_mut(node.idx)?.children.push(child_idx);
            }
            inner.slot_mut(node.idx)?.state = InflationState::Deep;
        }

        tracing::debug!(id = %id, children = attached, "children attached");
        Ok(())
    }

    fn hydrate_child_ids(&self, parent_id: NodeId, ids: &ChildIds) -> VitrineResult<Vec<AssetSnapshot>> {
        let wanted = ids
            .containers
            .iter()
            .map(|id| (*id, NodeKind::Container))
            .chain(ids.leaves.iter().map(|id| (*id, NodeKind::Leaf)));

        let mut snapshots = Vec::with_capacity(ids.len());
        for (child_id, kind) in wanted {
            match self.fetch_snapshot(child_id, Some(kind)) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) if e.is_not_found() => {
                    let race = NodeError::ConcurrentMutationRace { parent_id, child_id };
                    tracing::warn!(error = %race, "skipping vanished child");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(snapshots)
    }

    /// Store the child ids in the container's asset snapshot so the next
    /// deep inflation skips the store.
    fn remember_child_ids(&self, node: &Node, ids: ChildIds) -> VitrineResult<()> {
        let snapshot = node.tree.read(node.idx, |d| match &d.record {
            NodeRecord::Album(record) => Some(AssetSnapshot::Container(ContainerSnapshot {
                record: record.clone(),
                metadata: d.metadata.iter().map(|i| i.record.clone()).collect(),
                children: Some(ids),
            })),
            NodeRecord::Media(_) => None,
        })?;
        if let Some(snapshot) = snapshot {
            self.caches.put_asset(&snapshot);
        }
        Ok(())
    }

    /// Ids of the containers above `start`, nearest first, read through the
    /// snapshot tiers. Stops quietly at the first id that cannot be read.
    pub(crate) fn ancestor_ids(&self, start: Option<NodeId>) -> Vec<NodeId> {
        let mut ids = Vec::new();
        let mut current = start.filter(|id| id.is_persisted());
        while let Some(id) = current {
            if ids.contains(&id) || ids.len() > MAX_DEPTH {
                break;
            }
            ids.push(id);
            current = match self.fetch_snapshot(id, Some(NodeKind::Container)) {
                Ok(snapshot) => snapshot.parent_id(),
                Err(e) => {
                    tracing::debug!(id = %id, error = %e, "ancestor walk stopped");
                    None
                }
            };
        }
        ids
    }

    /// Container and leaf ids below `node` that are already materialized in
    /// its tree or recorded in cached container snapshots. Never reads the
    /// store.
    pub(crate) fn known_descendants(&self, node: &Node) -> (Vec<NodeId>, Vec<NodeId>) {
        let mut containers = BTreeSet::new();
        let mut leaves = BTreeSet::new();

        {
            let inner = node.tree.read_inner();
            for idx in inner.descendants(node.idx) {
                if let Some(slot) = inner.slots.get(idx) {
                    let id = slot.id();
                    if !id.is_persisted() {
                        continue;
                    }
                    match slot.kind() {
                        NodeKind::Container => containers.insert(id),
                        NodeKind::Leaf => leaves.insert(id),
                    };
                }
            }
        }

        let mut pending = vec![node.id()];
        pending.extend(containers.iter().copied());
        let mut visited = BTreeSet::new();
        while let Some(id) = pending.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(snapshot) = self.caches.get_asset(NodeKind::Container, id) else {
                continue;
            };
            if let Some(children) = snapshot.children() {
                for child in &children.containers {
                    containers.insert(*child);
                    pending.push(*child);
                }
                leaves.extend(children.leaves.iter().copied());
            }
        }

        containers.remove(&node.id());
        (containers.into_iter().collect(), leaves.into_iter().collect())
    }
}
