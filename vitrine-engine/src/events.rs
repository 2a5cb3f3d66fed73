//! Synchronous observer hooks on the save/delete pipeline.
//!
//! Observers are called in registration order at fixed points:
//!
//! | hook | when |
//! |------|------|
//! | `before_save` | after the engine's own validation, before the store write; an error aborts the save |
//! | `before_add_metadata` | before a new metadata item is added; `false` skips the item |
//! | `saved` | after the store write and cache purge |
//! | `deleted` | after the store delete and cache eviction |
//!
//! Observers must not call mutating [`Gallery`](crate::Gallery) operations
//! from inside a hook.

use serde::{Deserialize, Serialize};
use vitrine_core::{MetadataKind, NodeId, NodeKind, VitrineResult};

use crate::node::Node;

pub trait NodeObserver: Send + Sync {
    fn before_save(&self, _node: &Node) -> VitrineResult<()> {
        Ok(())
    }

    fn saved(&self, _node: &Node) {}

    fn deleted(&self, _event: &DeletedEvent) {}

    fn before_add_metadata(&self, _node: &Node, _kind: MetadataKind, _value: &str) -> bool {
        true
    }
}

/// Emitted once per deleted node.
///
/// The descendant sets are collected from whatever was already materialized
/// or cached before the delete; they are meant for targeted eviction, not as
/// an authoritative list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedEvent {
    pub id: NodeId,
    pub kind: NodeKind,
    pub parent_id: Option<NodeId>,
    pub container_ids: Vec<NodeId>,
    pub leaf_ids: Vec<NodeId>,
}

impl DeletedEvent {
    /// Every id the event covers, the deleted node included.
    pub fn all_ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::with_capacity(1 + self.container_ids.len() + self.leaf_ids.len());
        ids.push(self.id);
        ids.extend(self.container_ids.iter().copied());
        ids.extend(self.leaf_ids.iter().copied());
        ids
    }
}
