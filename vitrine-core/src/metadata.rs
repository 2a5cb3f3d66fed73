//! Metadata definitions: which kinds a gallery shows and how their values
//! are built.

use crate::{MetadataKind, NodeKind};
use serde::{Deserialize, Serialize};

/// Describes one metadata kind for a gallery.
///
/// `template` may reference other kinds as `{TokenName}`. Definitions are
/// evaluated in `sequence` order, so a template should only reference kinds
/// whose definitions come earlier (or kinds extracted directly).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataDefinition {
    pub kind: MetadataKind,
    pub display_name: String,
    pub template: String,
    pub visible_for_containers: bool,
    pub visible_for_leaves: bool,
    pub is_editable: bool,
    pub sequence: i32,
}

impl MetadataDefinition {
    pub fn new(kind: MetadataKind, template: impl Into<String>, sequence: i32) -> Self {
        Self {
            kind,
            display_name: kind.as_str().to_string(),
            template: template.into(),
            visible_for_containers: false,
            visible_for_leaves: true,
            is_editable: false,
            sequence,
        }
    }

    pub fn for_containers(mut self, visible: bool) -> Self {
        self.visible_for_containers = visible;
        self
    }

    pub fn for_leaves(mut self, visible: bool) -> Self {
        self.visible_for_leaves = visible;
        self
    }

    pub fn editable(mut self) -> Self {
        self.is_editable = true;
        self
    }

    /// Title and Caption apply to every node; everything else follows the
    /// visibility flags.
    pub fn applies_to(&self, kind: NodeKind) -> bool {
        if self.kind.is_required() {
            return true;
        }
        match kind {
            NodeKind::Container => self.visible_for_containers,
            NodeKind::Leaf => self.visible_for_leaves,
        }
    }

    /// The standard definition set of a new gallery.
    pub fn defaults() -> Vec<MetadataDefinition> {
        use MetadataKind::*;

        let mut defs = vec![
            MetadataDefinition::new(FileName, "{FileName}", 1),
            MetadataDefinition::new(FileNameWithoutExtension, "{FileNameWithoutExtension}", 2),
            MetadataDefinition::new(FileSizeKb, "{FileSizeKb} KB", 3),
            MetadataDefinition::new(DateAdded, "{DateAdded}", 4).for_containers(true),
            MetadataDefinition::new(Width, "{Width}", 5),
            MetadataDefinition::new(Height, "{Height}", 6),
            MetadataDefinition::new(Dimensions, "{Width} x {Height}", 7),
            MetadataDefinition::new(DatePictureTaken, "{DatePictureTaken}", 8),
            MetadataDefinition::new(CameraModel, "{CameraModel}", 9),
            MetadataDefinition::new(EquipmentManufacturer, "{EquipmentManufacturer}", 10),
            MetadataDefinition::new(Author, "{Author}", 11).editable(),
            MetadataDefinition::new(Copyright, "{Copyright}", 12).editable(),
            MetadataDefinition::new(Description, "{Description}", 13).editable(),
            MetadataDefinition::new(Keywords, "{Keywords}", 14).editable(),
            MetadataDefinition::new(Rating, "{Rating}", 15).editable(),
            MetadataDefinition::new(Orientation, "{Orientation}", 16),
            MetadataDefinition::new(Duration, "{Duration}", 17),
            MetadataDefinition::new(Comment, "{Comment}", 18).editable(),
            MetadataDefinition::new(HtmlSource, "{HtmlSource}", 19),
            MetadataDefinition::new(Title, "{Title}", 20).for_containers(true).editable(),
            MetadataDefinition::new(Caption, "{Caption}", 21).for_containers(true).editable(),
        ];
        defs.sort_by_key(|d| d.sequence);
        defs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_kinds_always_apply() {
        let title = MetadataDefinition::new(MetadataKind::Title, "{Title}", 1)
            .for_containers(false)
            .for_leaves(false);
        assert!(title.applies_to(NodeKind::Container));
        assert!(title.applies_to(NodeKind::Leaf));

        let camera = MetadataDefinition::new(MetadataKind::CameraModel, "{CameraModel}", 2);
        assert!(!camera.applies_to(NodeKind::Container));
        assert!(camera.applies_to(NodeKind::Leaf));
    }

    #[test]
    fn test_defaults_cover_every_kind_once() {
        let defs = MetadataDefinition::defaults();
        for kind in MetadataKind::ALL {
            assert_eq!(defs.iter().filter(|d| d.kind == kind).count(), 1, "{kind}");
        }
    }

    #[test]
    fn test_dimensions_follow_width_and_height() {
        let defs = MetadataDefinition::defaults();
        let pos = |k: MetadataKind| defs.iter().position(|d| d.kind == k).unwrap();
        assert!(pos(MetadataKind::Width) < pos(MetadataKind::Dimensions));
        assert!(pos(MetadataKind::Height) < pos(MetadataKind::Dimensions));
    }
}
