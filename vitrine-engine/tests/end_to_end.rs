use std::sync::Arc;

use vitrine_engine::{RepairOptions, SortOptions};
use vitrine_test_utils::assertions::*;
use vitrine_test_utils::{
    GalleryFixture, LeafKind, MetadataKind, NodeId, RecordingObserver, RenditionKind, TEST_USER,
};

#[test]
fn thumbnail_follows_only_leaf_then_clears_on_delete() {
    let fixture = GalleryFixture::new().expect("fixture");
    let album = fixture.album(fixture.root, "A").expect("album");
    fixture.store.set_next_id(7);
    let leaf = fixture.media(album, "m.jpg").expect("media");
    assert_eq!(leaf, NodeId::new(7));

    let a = fixture.gallery.load_writable(album).expect("load A");
    a.set_thumbnail_id(NodeId::NONE).expect("clear thumbnail");
    fixture
        .gallery
        .repair_thumbnail(&a, RepairOptions::default())
        .expect("repair");
    assert_eq!(a.thumbnail_id().unwrap(), NodeId::new(7));

    let m = a.child_leaves().expect("children").remove(0);
    assert_eq!(m.id(), leaf);
    fixture.gallery.delete(&m, false).expect("delete M");

    fixture
        .gallery
        .repair_thumbnail(&a, RepairOptions::default())
        .expect("repair again");
    assert_eq!(a.thumbnail_id().unwrap(), NodeId::NONE);

    let reloaded = fixture.gallery.load_container(album).expect("reload A");
    assert_eq!(reloaded.thumbnail_id().unwrap(), NodeId::NONE);
    assert!(reloaded.children().unwrap().is_empty());
}

#[test]
fn thumbnail_repair_skips_unsaved_leaves() {
    let fixture = GalleryFixture::new().expect("fixture");
    let album = fixture.album(fixture.root, "Mixed").expect("album");
    let a = fixture.gallery.load_writable(album).expect("load album");

    let l1 = fixture
        .gallery
        .create_leaf(&a, "draft.jpg", LeafKind::Image)
        .expect("create L1");
    assert!(l1.is_new());

    fixture.store.set_next_id(42);
    let l2 = fixture.media(album, "saved.jpg").expect("media L2");
    assert_eq!(l2, NodeId::new(42));

    a.set_thumbnail_id(NodeId::NONE).expect("clear thumbnail");
    fixture
        .gallery
        .repair_thumbnail(&a, RepairOptions::default())
        .expect("repair");

    let children = a.child_leaves().expect("children");
    assert_eq!(children.len(), 2);
    assert!(children[0].same_as(&l1));
    assert_eq!(children[1].id(), l2);
    assert_eq!(a.thumbnail_id().unwrap(), l2);
}

#[test]
fn new_leaf_becomes_thumbnail_of_empty_album() {
    let fixture = GalleryFixture::new().expect("fixture");
    let album = fixture.album(fixture.root, "Fresh").expect("album");
    let leaf = fixture.media(album, "first.jpg").expect("media");

    let stored = fixture.gallery.load_container(album).expect("load");
    assert_eq!(stored.thumbnail_id().unwrap(), leaf);
}

#[test]
fn album_lifecycle_creates_and_removes_directories() {
    let observer = Arc::new(RecordingObserver::new());
    let fixture = GalleryFixture::with_observer(observer.clone()).expect("fixture");

    let trips = fixture.album(fixture.root, "Trips: 2024?").expect("album");
    let node = fixture.gallery.load_container(trips).expect("load");
    assert_eq!(node.directory_name().unwrap(), "Trips 2024");
    let path = node.path().expect("path");
    assert!(fixture.files.directories().contains(&path));

    let leaf = fixture.media(trips, "dune.jpg").expect("media");
    let original = fixture
        .gallery
        .load_leaf(leaf)
        .expect("load leaf")
        .rendition_path(RenditionKind::Original)
        .expect("path")
        .expect("has file");
    assert!(original.starts_with(&path));

    let writable = fixture.gallery.load_writable(trips).expect("writable");
    let event = fixture.gallery.delete(&writable, false).expect("delete");
    assert_eq!(event.id, trips);
    assert!(event.all_ids().contains(&trips));
    assert!(!fixture.files.files().contains(&original));
    assert!(!fixture.files.directories().contains(&path));

    assert_not_found(&fixture.gallery.load(trips), trips);
    assert_not_found(&fixture.gallery.load(leaf), leaf);
    assert_eq!(observer.deleted().len(), 1);
    assert!(observer.saved().contains(&trips));
}

#[test]
fn keep_files_leaves_media_on_disk() {
    let fixture = GalleryFixture::new().expect("fixture");
    let album = fixture.album(fixture.root, "Keep").expect("album");
    let leaf = fixture.media(album, "keep.jpg").expect("media");
    let original = fixture
        .gallery
        .load_leaf(leaf)
        .unwrap()
        .rendition_path(RenditionKind::Original)
        .unwrap()
        .unwrap();

    let writable = fixture.gallery.load_writable(leaf).expect("writable");
    fixture.gallery.delete(&writable, true).expect("delete");
    assert!(fixture.files.files().contains(&original));
}

#[test]
fn new_leaf_gets_title_hash_and_file_name() {
    let fixture = GalleryFixture::new().expect("fixture");
    let album = fixture.album(fixture.root, "Beach").expect("album");
    let leaf = fixture.media(album, "sunset_01.jpg").expect("media");

    let node = fixture.gallery.load_leaf(leaf).expect("load");
    assert_eq!(node.title().unwrap(), "sunset_01");
    assert_eq!(node.hash_key().unwrap().len(), 64);
    assert_eq!(
        node.metadata_value(MetadataKind::FileName).unwrap().as_deref(),
        Some("sunset_01.jpg")
    );
    assert_eq!(node.audit().unwrap().created_by, TEST_USER);
}

#[test]
fn sort_then_reload_keeps_order() {
    let fixture = GalleryFixture::new().expect("fixture");
    let album = fixture.album(fixture.root, "Sorted").expect("album");
    for name in ["c.jpg", "a.jpg", "b.jpg"] {
        fixture.media(album, name).expect("media");
    }

    let a = fixture.gallery.load_writable(album).expect("writable");
    a.set_sort(MetadataKind::Title, true).expect("set sort");
    fixture.gallery.save(&a, TEST_USER).expect("save sort field");
    fixture
        .gallery
        .sort(&a, &SortOptions::persisted(TEST_USER))
        .expect("sort");

    let reloaded = fixture.gallery.load_container(album).expect("reload");
    let titles: Vec<String> = reloaded
        .children()
        .unwrap()
        .iter()
        .map(|c| c.title().unwrap())
        .collect();
    assert_eq!(titles, vec!["a", "b", "c"]);
    let sequences: Vec<i32> = reloaded
        .children()
        .unwrap()
        .iter()
        .map(|c| c.sequence().unwrap())
        .collect();
    assert_contiguous_sequences(&sequences);
}
