//! Asset snapshots: immutable, serializable images of a node.
//!
//! A snapshot is what the asset and leaf cache tiers hold. It carries enough
//! to rehydrate a node without touching the record store: the row itself, its
//! metadata rows and, for containers, the ids of the children that existed
//! when the snapshot was taken.

use crate::{AlbumRecord, GalleryId, MediaRecord, MetadataRecord, NodeId, NodeKind};
use serde::{Deserialize, Serialize};

/// Child membership captured at snapshot time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildIds {
    pub containers: Vec<NodeId>,
    pub leaves: Vec<NodeId>,
}

impl ChildIds {
    pub fn len(&self) -> usize {
        self.containers.len() + self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty() && self.leaves.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.containers.contains(&id) || self.leaves.contains(&id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    pub record: AlbumRecord,
    pub metadata: Vec<MetadataRecord>,
    /// `None` when the container was snapshotted before its children were loaded.
    pub children: Option<ChildIds>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafSnapshot {
    pub record: MediaRecord,
    pub metadata: Vec<MetadataRecord>,
}

/// Snapshot of either node kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssetSnapshot {
    Container(ContainerSnapshot),
    Leaf(LeafSnapshot),
}

impl AssetSnapshot {
    pub fn id(&self) -> NodeId {
        match self {
            AssetSnapshot::Container(c) => c.record.id,
            AssetSnapshot::Leaf(l) => l.record.id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            AssetSnapshot::Container(_) => NodeKind::Container,
            AssetSnapshot::Leaf(_) => NodeKind::Leaf,
        }
    }

    pub fn gallery_id(&self) -> GalleryId {
        match self {
            AssetSnapshot::Container(c) => c.record.gallery_id,
            AssetSnapshot::Leaf(l) => l.record.gallery_id,
        }
    }

    pub fn parent_id(&self) -> Option<NodeId> {
        match self {
            AssetSnapshot::Container(c) => c.record.parent_id,
            AssetSnapshot::Leaf(l) => Some(l.record.album_id),
        }
    }

    pub fn metadata(&self) -> &[MetadataRecord] {
        match self {
            AssetSnapshot::Container(c) => &c.metadata,
            AssetSnapshot::Leaf(l) => &l.metadata,
        }
    }

    /// Child ids, for container snapshots taken after children were loaded.
    pub fn children(&self) -> Option<&ChildIds> {
        match self {
            AssetSnapshot::Container(c) => c.children.as_ref(),
            AssetSnapshot::Leaf(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_ids() {
        let ids = ChildIds {
            containers: vec![NodeId::new(2)],
            leaves: vec![NodeId::new(3), NodeId::new(4)],
        };
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(NodeId::new(4)));
        assert!(!ids.contains(NodeId::new(5)));
        assert!(ChildIds::default().is_empty());
    }
}
