use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use vitrine_test_utils::{GalleryFixture, NodeKind};

fn seeded_fixture() -> (GalleryFixture, vitrine_test_utils::NodeId) {
    let fixture = GalleryFixture::new().expect("build fixture");
    let album = fixture.album(fixture.root, "Bench").expect("create album");
    for i in 0..32 {
        fixture
            .media(album, &format!("frame_{:03}.jpg", i))
            .expect("create media");
    }
    (fixture, album)
}

fn bench_loads(c: &mut Criterion) {
    let (fixture, album) = seeded_fixture();

    // Warm the inflated tier once; every iteration is then a shared hit.
    fixture.gallery.load_container(album).expect("warm load");
    c.bench_function("load/inflated_hit", |b| {
        b.iter(|| {
            let node = fixture.gallery.load_container(black_box(album)).expect("load");
            black_box(node.id());
        });
    });

    c.bench_function("load/snapshot_tier", |b| {
        b.iter(|| {
            let node = fixture.gallery.load_writable(black_box(album)).expect("load");
            black_box(node.title().expect("title"));
        });
    });

    c.bench_function("load/record_store", |b| {
        b.iter(|| {
            fixture.gallery.caches().invalidate(album);
            let node = fixture.gallery.load_writable(black_box(album)).expect("load");
            black_box(node.title().expect("title"));
        });
    });

    c.bench_function("load/children_hydration", |b| {
        b.iter(|| {
            let node = fixture.gallery.load_writable(black_box(album)).expect("load");
            let children = node.children().expect("children");
            black_box(children.len());
        });
    });
}

fn bench_cache_report(c: &mut Criterion) {
    let (fixture, album) = seeded_fixture();
    fixture.gallery.load_container(album).expect("warm load");

    c.bench_function("cache/asset_lookup", |b| {
        b.iter(|| {
            black_box(
                fixture
                    .gallery
                    .caches()
                    .get_asset(NodeKind::Container, black_box(album)),
            );
        });
    });
}

criterion_group!(benches, bench_loads, bench_cache_report);
criterion_main!(benches);
