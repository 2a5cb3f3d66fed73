//! Enum types for gallery entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CORE ENUMS
// ============================================================================

/// Entity type discriminator used in storage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Node,
    Metadata,
    Role,
    Gallery,
    Setting,
}

/// The two shapes a gallery node can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    /// An album: owns child membership, has a directory on disk.
    Container,
    /// A media asset: owns three renditions.
    Leaf,
}

impl NodeKind {
    /// Single-byte discriminant used in binary cache keys.
    pub const fn as_byte(self) -> u8 {
        match self {
            NodeKind::Container => 0,
            NodeKind::Leaf => 1,
        }
    }

    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(NodeKind::Container),
            1 => Some(NodeKind::Leaf),
            _ => None,
        }
    }
}

/// Media category of a leaf, persisted as its `media_type` discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeafKind {
    Image,
    Video,
    Audio,
    Document,
    /// Embedded third-party content; the original is HTML, not a file.
    External,
}

impl LeafKind {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            LeafKind::Image => "Image",
            LeafKind::Video => "Video",
            LeafKind::Audio => "Audio",
            LeafKind::Document => "Document",
            LeafKind::External => "External",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, LeafKindParseError> {
        match normalize_token(s).as_str() {
            "image" => Ok(LeafKind::Image),
            "video" => Ok(LeafKind::Video),
            "audio" => Ok(LeafKind::Audio),
            "document" | "generic" => Ok(LeafKind::Document),
            "external" => Ok(LeafKind::External),
            _ => Err(LeafKindParseError(s.to_string())),
        }
    }

    /// Whether the original rendition is a file on disk.
    pub fn has_original_file(&self) -> bool {
        !matches!(self, LeafKind::External)
    }
}

impl fmt::Display for LeafKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for LeafKind {
    type Err = LeafKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an unknown media type discriminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafKindParseError(pub String);

impl fmt::Display for LeafKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid media type: {}", self.0)
    }
}

impl std::error::Error for LeafKindParseError {}

/// Which representation of a leaf's media a rendition describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenditionKind {
    Thumbnail,
    Optimized,
    Original,
}

impl RenditionKind {
    pub const ALL: [RenditionKind; 3] = [
        RenditionKind::Thumbnail,
        RenditionKind::Optimized,
        RenditionKind::Original,
    ];
}

/// Kind of a metadata item. Each node holds at most one item per kind.
///
/// The string form doubles as the token name inside metadata templates,
/// e.g. `{FileNameWithoutExtension}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MetadataKind {
    Title,
    Caption,
    FileName,
    FileNameWithoutExtension,
    FileSizeKb,
    DateAdded,
    DatePictureTaken,
    Author,
    CameraModel,
    EquipmentManufacturer,
    Copyright,
    Description,
    Dimensions,
    Width,
    Height,
    Keywords,
    Rating,
    Orientation,
    Duration,
    Comment,
    HtmlSource,
}

impl MetadataKind {
    pub const ALL: [MetadataKind; 21] = [
        MetadataKind::Title,
        MetadataKind::Caption,
        MetadataKind::FileName,
        MetadataKind::FileNameWithoutExtension,
        MetadataKind::FileSizeKb,
        MetadataKind::DateAdded,
        MetadataKind::DatePictureTaken,
        MetadataKind::Author,
        MetadataKind::CameraModel,
        MetadataKind::EquipmentManufacturer,
        MetadataKind::Copyright,
        MetadataKind::Description,
        MetadataKind::Dimensions,
        MetadataKind::Width,
        MetadataKind::Height,
        MetadataKind::Keywords,
        MetadataKind::Rating,
        MetadataKind::Orientation,
        MetadataKind::Duration,
        MetadataKind::Comment,
        MetadataKind::HtmlSource,
    ];

    /// Token name as used in templates and persisted settings.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataKind::Title => "Title",
            MetadataKind::Caption => "Caption",
            MetadataKind::FileName => "FileName",
            MetadataKind::FileNameWithoutExtension => "FileNameWithoutExtension",
            MetadataKind::FileSizeKb => "FileSizeKb",
            MetadataKind::DateAdded => "DateAdded",
            MetadataKind::DatePictureTaken => "DatePictureTaken",
            MetadataKind::Author => "Author",
            MetadataKind::CameraModel => "CameraModel",
            MetadataKind::EquipmentManufacturer => "EquipmentManufacturer",
            MetadataKind::Copyright => "Copyright",
            MetadataKind::Description => "Description",
            MetadataKind::Dimensions => "Dimensions",
            MetadataKind::Width => "Width",
            MetadataKind::Height => "Height",
            MetadataKind::Keywords => "Keywords",
            MetadataKind::Rating => "Rating",
            MetadataKind::Orientation => "Orientation",
            MetadataKind::Duration => "Duration",
            MetadataKind::Comment => "Comment",
            MetadataKind::HtmlSource => "HtmlSource",
        }
    }

    /// Kinds that every node must carry, even with an empty value.
    pub fn is_required(&self) -> bool {
        matches!(self, MetadataKind::Title | MetadataKind::Caption)
    }

    /// Kinds computed from the node's own fields rather than read from the
    /// media file. These are evaluated even when extraction is disabled.
    pub fn is_computed(&self) -> bool {
        matches!(
            self,
            MetadataKind::FileName
                | MetadataKind::FileNameWithoutExtension
                | MetadataKind::FileSizeKb
                | MetadataKind::DateAdded
                | MetadataKind::HtmlSource
        )
    }

    /// The one kind whose value is externally supplied HTML and must not be
    /// sanitized.
    pub fn is_raw_html(&self) -> bool {
        matches!(self, MetadataKind::HtmlSource)
    }
}

// ============================================================================
// STRING CONVERSIONS
// ============================================================================

fn normalize_token(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            EntityType::Node => "Node",
            EntityType::Metadata => "Metadata",
            EntityType::Role => "Role",
            EntityType::Gallery => "Gallery",
            EntityType::Setting => "Setting",
        };
        write!(f, "{}", value)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            NodeKind::Container => "Container",
            NodeKind::Leaf => "Leaf",
        };
        write!(f, "{}", value)
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MetadataKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_token(s);
        MetadataKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().to_ascii_lowercase() == normalized)
            .ok_or_else(|| format!("Invalid MetadataKind: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_kind_round_trip_and_aliases() {
        for kind in [
            LeafKind::Image,
            LeafKind::Video,
            LeafKind::Audio,
            LeafKind::Document,
            LeafKind::External,
        ] {
            assert_eq!(LeafKind::from_db_str(kind.as_db_str()), Ok(kind));
        }
        assert_eq!(LeafKind::from_db_str("generic"), Ok(LeafKind::Document));
        assert!(LeafKind::from_db_str("hologram").is_err());
    }

    #[test]
    fn test_metadata_kind_parse_is_lenient() {
        assert_eq!("Title".parse::<MetadataKind>(), Ok(MetadataKind::Title));
        assert_eq!("file_size_kb".parse::<MetadataKind>(), Ok(MetadataKind::FileSizeKb));
        assert_eq!(
            "FileNameWithoutExtension".parse::<MetadataKind>(),
            Ok(MetadataKind::FileNameWithoutExtension)
        );
        assert!("Nope".parse::<MetadataKind>().is_err());
    }

    #[test]
    fn test_node_kind_bytes() {
        assert_eq!(NodeKind::from_byte(NodeKind::Leaf.as_byte()), Some(NodeKind::Leaf));
        assert_eq!(NodeKind::from_byte(9), None);
    }

    #[test]
    fn test_required_and_computed_sets() {
        let required: Vec<_> = MetadataKind::ALL.iter().filter(|k| k.is_required()).collect();
        assert_eq!(required, vec![&MetadataKind::Title, &MetadataKind::Caption]);
        assert!(MetadataKind::FileName.is_computed());
        assert!(!MetadataKind::CameraModel.is_computed());
        assert!(MetadataKind::HtmlSource.is_raw_html());
    }
}
