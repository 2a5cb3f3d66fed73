//! Persisted record structures
//!
//! These are the flat rows the record store hands back. The engine turns them
//! into nodes; nothing in here knows about trees or caches.

use crate::{GalleryId, LeafKind, LeafKindParseError, MetadataKind, NodeId, NodeKind, Timestamp};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Album row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlbumRecord {
    pub id: NodeId,
    pub gallery_id: GalleryId,
    /// `None` for the root album of a gallery.
    pub parent_id: Option<NodeId>,
    /// Physical directory segment; empty for the root album.
    pub directory_name: String,
    pub title: String,
    pub sequence: i32,
    pub is_private: bool,
    /// Leaf whose thumbnail represents this album, or [`NodeId::NONE`].
    pub thumbnail_id: NodeId,
    pub sort_by: MetadataKind,
    pub sort_ascending: bool,
    pub owned_by: String,
    pub owner_role_name: String,
    pub created_by: String,
    pub date_added: Timestamp,
    pub last_modified_by: String,
    pub date_last_modified: Timestamp,
}

/// One stored representation of a leaf's media.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenditionRecord {
    /// File name inside the album directory; empty when the rendition has no file.
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub size_kb: u64,
}

impl RenditionRecord {
    pub fn new(file_name: impl Into<String>, width: u32, height: u32, size_kb: u64) -> Self {
        Self {
            file_name: file_name.into(),
            width,
            height,
            size_kb,
        }
    }

    pub fn has_file(&self) -> bool {
        !self.file_name.is_empty()
    }
}

/// Media asset row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: NodeId,
    pub gallery_id: GalleryId,
    pub album_id: NodeId,
    /// Discriminator parsed into [`LeafKind`].
    pub media_type: String,
    pub title: String,
    pub hash_key: String,
    pub thumbnail: RenditionRecord,
    pub optimized: RenditionRecord,
    pub original: RenditionRecord,
    /// Embed code for external media; the original then has no file.
    pub external_html: Option<String>,
    pub sequence: i32,
    pub is_private: bool,
    pub created_by: String,
    pub date_added: Timestamp,
    pub last_modified_by: String,
    pub date_last_modified: Timestamp,
}

impl MediaRecord {
    pub fn leaf_kind(&self) -> Result<LeafKind, LeafKindParseError> {
        LeafKind::from_db_str(&self.media_type)
    }
}

/// A row from either node table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeRecord {
    Album(AlbumRecord),
    Media(MediaRecord),
}

impl NodeRecord {
    pub fn id(&self) -> NodeId {
        match self {
            NodeRecord::Album(a) => a.id,
            NodeRecord::Media(m) => m.id,
        }
    }

    pub fn set_id(&mut self, id: NodeId) {
        match self {
            NodeRecord::Album(a) => a.id = id,
            NodeRecord::Media(m) => m.id = id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeRecord::Album(_) => NodeKind::Container,
            NodeRecord::Media(_) => NodeKind::Leaf,
        }
    }

    pub fn gallery_id(&self) -> GalleryId {
        match self {
            NodeRecord::Album(a) => a.gallery_id,
            NodeRecord::Media(m) => m.gallery_id,
        }
    }

    pub fn parent_id(&self) -> Option<NodeId> {
        match self {
            NodeRecord::Album(a) => a.parent_id,
            NodeRecord::Media(m) => Some(m.album_id),
        }
    }

    pub fn sequence(&self) -> i32 {
        match self {
            NodeRecord::Album(a) => a.sequence,
            NodeRecord::Media(m) => m.sequence,
        }
    }
}

/// Metadata row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Row id; `0` for rows not yet inserted.
    pub id: i64,
    pub node_id: NodeId,
    pub kind: MetadataKind,
    /// Unformatted value as extracted, when it differs from `value`.
    pub raw_value: Option<String>,
    pub value: String,
}

bitflags! {
    /// Permissions a role grants on the albums it is assigned to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct RolePermissions: u32 {
        const VIEW_ALBUM_OR_MEDIA = 1 << 0;
        const VIEW_ORIGINAL = 1 << 1;
        const ADD_CHILD_ALBUM = 1 << 2;
        const ADD_MEDIA = 1 << 3;
        const EDIT_ALBUM = 1 << 4;
        const EDIT_MEDIA = 1 << 5;
        const DELETE_CHILD_ALBUM = 1 << 6;
        const DELETE_MEDIA = 1 << 7;
        const SYNCHRONIZE = 1 << 8;
        const ADMINISTER_GALLERY = 1 << 9;
        const HIDE_WATERMARK = 1 << 10;
    }
}

/// Role row with its explicit album assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRecord {
    pub name: String,
    pub gallery_id: GalleryId,
    pub permissions: RolePermissions,
    /// Albums the role is explicitly assigned to. Descendants inherit.
    pub album_ids: Vec<NodeId>,
}

impl RoleRecord {
    pub fn is_assigned_to(&self, album_id: NodeId) -> bool {
        self.album_ids.contains(&album_id)
    }
}

/// Gallery row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryRecord {
    pub id: GalleryId,
    pub description: String,
    pub is_template: bool,
    pub date_added: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_media(media_type: &str) -> MediaRecord {
        MediaRecord {
            id: NodeId::new(3),
            gallery_id: 1,
            album_id: NodeId::new(1),
            media_type: media_type.to_string(),
            title: "Beach".to_string(),
            hash_key: String::new(),
            thumbnail: RenditionRecord::new("zThumb_beach.jpg", 115, 80, 6),
            optimized: RenditionRecord::new("zOpt_beach.jpg", 640, 480, 90),
            original: RenditionRecord::new("beach.jpg", 4000, 3000, 2100),
            external_html: None,
            sequence: 1,
            is_private: false,
            created_by: "admin".to_string(),
            date_added: Utc::now(),
            last_modified_by: "admin".to_string(),
            date_last_modified: Utc::now(),
        }
    }

    #[test]
    fn test_media_record_kind() {
        assert_eq!(make_media("Image").leaf_kind(), Ok(LeafKind::Image));
        assert!(make_media("Hologram").leaf_kind().is_err());
    }

    #[test]
    fn test_node_record_accessors() {
        let mut record = NodeRecord::Media(make_media("Video"));
        assert_eq!(record.kind(), NodeKind::Leaf);
        assert_eq!(record.parent_id(), Some(NodeId::new(1)));
        record.set_id(NodeId::new(99));
        assert_eq!(record.id(), NodeId::new(99));
    }

    #[test]
    fn test_role_permissions_serde() {
        let role = RoleRecord {
            name: "Editors".to_string(),
            gallery_id: 1,
            permissions: RolePermissions::VIEW_ALBUM_OR_MEDIA | RolePermissions::EDIT_ALBUM,
            album_ids: vec![NodeId::new(5)],
        };
        let json = serde_json::to_string(&role).unwrap();
        let back: RoleRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, role);
        assert!(back.is_assigned_to(NodeId::new(5)));
        assert!(!back.is_assigned_to(NodeId::new(6)));
    }
}
