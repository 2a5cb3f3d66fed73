//! Vitrine Test Utilities
//!
//! Shared test infrastructure for the Vitrine workspace:
//! - A seeded gallery over in-memory storage and files
//! - Mock extractor and recording observer
//! - Proptest generators for names, titles and metadata
//! - Assertions for the engine's error taxonomy

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// Re-export mocks from their source crate
pub use vitrine_storage::{MockFileMover, MockStorage, RecordStore};

// Re-export core types for convenience
pub use vitrine_core::{
    GalleryId, GalleryRecord, GallerySettings, LeafKind, MetadataDefinition, MetadataKind,
    NodeError, NodeId, NodeKind, NodeRecord, RenditionKind, RenditionRecord, RoleRecord,
    RolePermissions, SettingName, ValidationError, VitrineError, VitrineResult,
};

pub use vitrine_engine::{
    DeletedEvent, ExtractedValue, ExtractionRequest, Gallery, MetadataExtractor, Node,
    NodeObserver,
};

// ============================================================================
// MOCK EXTRACTOR
// ============================================================================

/// Extractor that returns a fixed set of values for every file.
#[derive(Debug, Default)]
pub struct MockExtractor {
    values: HashMap<MetadataKind, ExtractedValue>,
    calls: AtomicUsize,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, kind: MetadataKind, formatted: impl Into<String>) -> Self {
        self.values.insert(kind, ExtractedValue::new(formatted));
        self
    }

    /// Number of files read so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetadataExtractor for MockExtractor {
    fn extract(
        &self,
        _request: &ExtractionRequest<'_>,
    ) -> VitrineResult<HashMap<MetadataKind, ExtractedValue>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.values.clone())
    }
}

// ============================================================================
// RECORDING OBSERVER
// ============================================================================

/// Observer that records every hook call. Optionally vetoes saves.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    before_save: AtomicUsize,
    saved: Mutex<Vec<NodeId>>,
    deleted: Mutex<Vec<DeletedEvent>>,
    veto: Option<String>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// An observer whose `before_save` fails with `reason`.
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            veto: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn before_save_calls(&self) -> usize {
        self.before_save.load(Ordering::SeqCst)
    }

    pub fn saved(&self) -> Vec<NodeId> {
        self.saved.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn deleted(&self) -> Vec<DeletedEvent> {
        self.deleted.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

impl NodeObserver for RecordingObserver {
    fn before_save(&self, _node: &Node) -> VitrineResult<()> {
        self.before_save.fetch_add(1, Ordering::SeqCst);
        match &self.veto {
            Some(reason) => Err(NodeError::invalid_state(reason.clone()).into()),
            None => Ok(()),
        }
    }

    fn saved(&self, node: &Node) {
        if let Ok(mut saved) = self.saved.lock() {
            saved.push(node.id());
        }
    }

    fn deleted(&self, event: &DeletedEvent) {
        if let Ok(mut deleted) = self.deleted.lock() {
            deleted.push(event.clone());
        }
    }
}

// ============================================================================
// GALLERY FIXTURE
// ============================================================================

/// Media root used by every fixture gallery.
pub const MEDIA_ROOT: &str = "/gallery";

/// Username recorded by fixture writes.
pub const TEST_USER: &str = "tester";

/// A gallery over [`MockStorage`] and [`MockFileMover`] with its root album
/// already saved.
pub struct GalleryFixture {
    pub store: Arc<MockStorage>,
    pub files: Arc<MockFileMover>,
    pub gallery: Gallery,
    pub gallery_id: GalleryId,
    pub root: NodeId,
}

impl GalleryFixture {
    pub fn new() -> VitrineResult<Self> {
        Self::build(|builder| builder)
    }

    /// Fixture whose gallery also notifies `observer`.
    pub fn with_observer(observer: Arc<dyn NodeObserver>) -> VitrineResult<Self> {
        Self::build(|builder| builder.observer(observer))
    }

    /// Fixture whose gallery reads metadata with `extractor`.
    pub fn with_extractor(extractor: Arc<dyn MetadataExtractor>) -> VitrineResult<Self> {
        Self::build(|builder| builder.extractor(extractor))
    }

    fn build<F>(configure: F) -> VitrineResult<Self>
    where
        F: FnOnce(vitrine_engine::GalleryBuilder) -> vitrine_engine::GalleryBuilder,
    {
        let gallery_id = 1;
        let store = Arc::new(MockStorage::new());
        let files = Arc::new(MockFileMover::new());

        store.gallery_save(&fixtures::gallery_record(gallery_id))?;
        for (name, value) in fixtures::settings_pairs() {
            store.setting_save(gallery_id, name.as_str(), &value)?;
        }

        let builder = Gallery::builder(store.clone() as Arc<dyn RecordStore>)
            .files(files.clone() as Arc<dyn vitrine_storage::FileMover>)
            .caches(vitrine_engine::CacheTiers::in_memory(64));
        let gallery = configure(builder).build()?;

        let root = gallery.create_root(gallery_id)?;
        root.set_title("All albums")?;
        gallery.save(&root, TEST_USER)?;
        let root = root.id();

        Ok(Self {
            store,
            files,
            gallery,
            gallery_id,
            root,
        })
    }

    /// Save a new album titled `title` below `parent`.
    pub fn album(&self, parent: NodeId, title: &str) -> VitrineResult<NodeId> {
        let album = self.gallery.create_empty(parent)?;
        album.set_title(title)?;
        self.gallery.save(&album, TEST_USER)?;
        Ok(album.id())
    }

    /// Save a new image in `album` and seed its original and thumbnail
    /// files.
    pub fn media(&self, album: NodeId, file_name: &str) -> VitrineResult<NodeId> {
        let parent = self.gallery.load_writable(album)?;
        let leaf = self.gallery.create_leaf(&parent, file_name, LeafKind::Image)?;
        let settings = self.gallery.settings(self.gallery_id)?;
        leaf.set_rendition(
            RenditionKind::Original,
            RenditionRecord::new(file_name, 1024, 768, 512),
        )?;
        leaf.set_rendition(
            RenditionKind::Thumbnail,
            RenditionRecord::new(
                format!("{}{}", settings.thumbnail_file_prefix, file_name),
                115,
                86,
                4,
            ),
        )?;
        self.gallery.save(&leaf, TEST_USER)?;

        for kind in [RenditionKind::Original, RenditionKind::Thumbnail] {
            if let Some(path) = leaf.rendition_path(kind)? {
                self.files.add_file(path);
            }
        }
        Ok(leaf.id())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating Vitrine values.

    use super::*;
    use proptest::prelude::*;

    /// Album titles, including characters a directory name cannot hold.
    pub fn arb_title() -> impl Strategy<Value = String> {
        "[A-Za-z0-9 :?*<>|.-]{1,40}"
    }

    /// Directory names as a user might type them.
    pub fn arb_directory_name() -> impl Strategy<Value = String> {
        "[A-Za-z0-9 _()-]{1,30}"
    }

    /// Original file names with a common extension.
    pub fn arb_file_name() -> impl Strategy<Value = String> {
        ("[a-z][a-z0-9_]{0,15}", prop_oneof!["jpg", "png", "mp4", "pdf"])
            .prop_map(|(stem, ext)| format!("{}.{}", stem, ext))
    }

    pub fn arb_leaf_kind() -> impl Strategy<Value = LeafKind> {
        prop_oneof![
            Just(LeafKind::Image),
            Just(LeafKind::Video),
            Just(LeafKind::Audio),
            Just(LeafKind::Document),
        ]
    }

    pub fn arb_metadata_kind() -> impl Strategy<Value = MetadataKind> {
        proptest::sample::select(MetadataKind::ALL.to_vec())
    }

    /// Free-text metadata values, sometimes carrying markup.
    pub fn arb_metadata_value() -> impl Strategy<Value = String> {
        prop_oneof![
            "[A-Za-z0-9 ,.]{0,40}",
            "[A-Za-z ]{1,10}".prop_map(|s| format!("<b>{}</b>", s)),
        ]
    }

    /// Sequence values as found on unsorted siblings: duplicates allowed.
    pub fn arb_sequences(max_len: usize) -> impl Strategy<Value = Vec<i32>> {
        proptest::collection::vec(0i32..5, 1..max_len.max(2))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records and settings for common scenarios.

    use super::*;
    use chrono::Utc;

    pub fn gallery_record(gallery_id: GalleryId) -> GalleryRecord {
        GalleryRecord {
            id: gallery_id,
            description: format!("Test gallery {}", gallery_id),
            is_template: false,
            date_added: Utc::now(),
        }
    }

    /// Stored settings of a fixture gallery.
    pub fn settings_pairs() -> Vec<(SettingName, String)> {
        let definitions = serde_json::to_string(&MetadataDefinition::defaults()).unwrap_or_default();
        vec![
            (SettingName::MediaObjectPath, MEDIA_ROOT.to_string()),
            (SettingName::ExtractMetadata, "true".to_string()),
            (SettingName::MaxDirectoryNameLength, "25".to_string()),
            (SettingName::MetadataDisplaySettings, definitions),
        ]
    }

    /// Settings equal to what a fixture gallery loads.
    pub fn settings(gallery_id: GalleryId) -> GallerySettings {
        GallerySettings::new(gallery_id, MEDIA_ROOT)
    }

    pub fn role(gallery_id: GalleryId, name: &str, album_ids: Vec<NodeId>) -> RoleRecord {
        RoleRecord {
            name: name.to_string(),
            gallery_id,
            permissions: RolePermissions::VIEW_ALBUM_OR_MEDIA,
            album_ids,
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Vitrine's error taxonomy.

    use super::*;

    /// Assert that a VitrineResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &VitrineResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a VitrineResult is Err.
    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &VitrineResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    /// Assert that a VitrineResult is a NotFound node error for `id`.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &VitrineResult<T>, id: NodeId) {
        match result {
            Err(VitrineError::Node(NodeError::NotFound { id: got, .. })) => {
                assert_eq!(*got, id, "Wrong id in NotFound error");
            }
            other => panic!("Expected NotFound error for {}, got: {:?}", id, other),
        }
    }

    /// Assert that a VitrineResult is an InvalidState node error.
    #[track_caller]
    pub fn assert_invalid_state<T: std::fmt::Debug>(result: &VitrineResult<T>) {
        match result {
            Err(VitrineError::Node(NodeError::InvalidState { .. })) => {}
            other => panic!("Expected InvalidState error, got: {:?}", other),
        }
    }

    /// Assert that a VitrineResult is an UnsupportedKind node error.
    #[track_caller]
    pub fn assert_unsupported_kind<T: std::fmt::Debug>(result: &VitrineResult<T>, discriminator: &str) {
        match result {
            Err(VitrineError::Node(NodeError::UnsupportedKind { discriminator: got, .. })) => {
                assert_eq!(got, discriminator, "Wrong discriminator");
            }
            other => panic!("Expected UnsupportedKind error, got: {:?}", other),
        }
    }

    /// Assert that a VitrineResult is a CircularReference validation error.
    #[track_caller]
    pub fn assert_circular_reference<T: std::fmt::Debug>(result: &VitrineResult<T>) {
        match result {
            Err(VitrineError::Validation(ValidationError::CircularReference { .. })) => {}
            other => panic!("Expected CircularReference error, got: {:?}", other),
        }
    }

    /// Assert that sibling sequences run 1..=n with no gaps or duplicates.
    #[track_caller]
    pub fn assert_contiguous_sequences(sequences: &[i32]) {
        let mut sorted = sequences.to_vec();
        sorted.sort_unstable();
        let expected: Vec<i32> = (1..=sequences.len() as i32).collect();
        assert_eq!(sorted, expected, "Sequences are not contiguous from 1");
    }
}

#[cfg(test)]
mod tests {
    use super::assertions::*;
    use super::*;

    #[test]
    fn test_fixture_seeds_root_album() {
        let fixture = GalleryFixture::new().unwrap();
        let root = fixture.gallery.load_root(fixture.gallery_id).unwrap();
        assert_eq!(root.id(), fixture.root);
        assert_eq!(root.parent_id().unwrap(), None);
        assert_eq!(root.title().unwrap(), "All albums");
    }

    #[test]
    fn test_fixture_media_seeds_files() {
        let fixture = GalleryFixture::new().unwrap();
        let album = fixture.album(fixture.root, "Trips").unwrap();
        let leaf = fixture.media(album, "beach.jpg").unwrap();

        let node = fixture.gallery.load_leaf(leaf).unwrap();
        let original = node.rendition_path(RenditionKind::Original).unwrap().unwrap();
        assert!(fixture.files.files().contains(&original));
    }

    #[test]
    fn test_mock_extractor_counts_calls() {
        let extractor = MockExtractor::new().with_value(MetadataKind::CameraModel, "X100");
        let request = ExtractionRequest {
            node_id: NodeId::new(1),
            leaf_kind: LeafKind::Image,
            file_name: "a.jpg",
            original_path: None,
        };
        let values = extractor.extract(&request).unwrap();
        assert_eq!(values[&MetadataKind::CameraModel].formatted, "X100");
        assert_eq!(extractor.calls(), 1);
    }

    #[test]
    fn test_assert_contiguous_sequences() {
        assert_contiguous_sequences(&[2, 1, 3]);
        assert_ok(&Ok::<_, VitrineError>(()));
    }
}
