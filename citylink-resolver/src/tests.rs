//! Unit tests for the cross-reference resolver.

use std::sync::Arc;

use camino::Utf8PathBuf;
use citylink_cache::IdentityCaches;
use citylink_core::test_support::{BUILDING_CLASS, FURNITURE_CLASS, fixture_schema};
use citylink_core::{
    BackingLocation, BasicDirection, CacheConfig, CacheEntry, DeferredReference, ReferenceKind,
    ResolverConfig,
};
use rstest::{fixture, rstest};
use rusqlite::OptionalExtension;
use tempfile::TempDir;

use super::*;

struct Harness {
    resolver: CrossReferenceResolver,
    _files: TempDir,
    base_dir: Utf8PathBuf,
}

impl Harness {
    fn caches(&self) -> &IdentityCaches {
        self.resolver.context().caches()
    }

    fn database(&self) -> &CityDatabase {
        self.resolver.context().database()
    }

    fn scalar(&self, sql: &str) -> Option<i64> {
        self.database()
            .lock()
            .query_row(sql, [], |row| row.get::<_, Option<i64>>(0))
            .optional()
            .expect("run scalar query")
            .flatten()
    }
}

fn harness_with(capacity: usize, batch_size: usize) -> Harness {
    let files = TempDir::new().expect("create texture dir");
    let base_dir = Utf8PathBuf::from_path_buf(files.path().to_path_buf()).expect("utf8 dir");
    let caches = IdentityCaches::new(&CacheConfig {
        capacity,
        drain_factor: 0.5,
        partitions: 2,
        batch_size: 4,
        location: BackingLocation::InMemory,
    })
    .expect("create caches");
    let database = CityDatabase::open_in_memory().expect("open city database");
    database
        .lock()
        .execute_batch(
            "CREATE TABLE building (id INTEGER PRIMARY KEY, address_id INTEGER);
             INSERT INTO surface_geometry (id, geometry) VALUES (100, x'01'), (5, NULL);
             INSERT INTO building (id) VALUES (1000);
             INSERT INTO cityobjectgroup (id) VALUES (7);
             INSERT INTO tex_image (id) VALUES (3);",
        )
        .expect("seed city database");
    let context = RunContext::new(
        Arc::new(caches),
        Arc::new(database),
        Arc::new(fixture_schema()),
        ResolverConfig {
            batch_size,
            base_dir: base_dir.clone(),
        },
    );
    Harness {
        resolver: CrossReferenceResolver::new(context).expect("create resolver"),
        _files: files,
        base_dir,
    }
}

#[fixture]
fn harness() -> Harness {
    harness_with(1000, 100)
}

#[rstest]
fn forward_reference_is_patched(harness: Harness) {
    harness
        .caches()
        .geometry()
        .put(CacheEntry::new("poly-1", 100, "surface_geometry").reversed(true))
        .expect("register geometry");
    let item = DeferredReference::surface_geometry(5, "#poly-1", false).expect("valid item");
    assert!(harness.resolver.resolve(&item).expect("resolve"));
    assert_eq!(harness.resolver.pending(ReferenceKind::SurfaceGeometry), 1);
    harness.resolver.execute_batch().expect("flush");
    assert_eq!(
        harness.scalar("SELECT is_xlink + is_reverse * 10 FROM surface_geometry WHERE id = 5"),
        Some(11)
    );
    assert_eq!(
        harness.scalar("SELECT length(geometry) FROM surface_geometry WHERE id = 5"),
        Some(1)
    );
}

#[rstest]
fn unknown_targets_are_terminal_misses(harness: Harness) {
    let item = DeferredReference::group_member(7, "nobody", None, false).expect("valid item");
    assert!(!harness.resolver.resolve(&item).expect("resolve"));
    let report = harness.resolver.close().expect("close");
    assert_eq!(report.unresolved(ReferenceKind::GroupMember), 1);
    assert_eq!(
        report.outcome(),
        RunOutcome::SucceededWithWarnings { unresolved: 1 }
    );
}

#[rstest]
fn targets_drained_to_disk_still_resolve() {
    let harness = harness_with(4, 100);
    for key in 1..=20 {
        harness
            .caches()
            .object()
            .put(CacheEntry::new(format!("member-{key}"), key, "cityobject"))
            .expect("register member");
    }
    assert!(harness.caches().object().is_backed_by_disk());
    let item = DeferredReference::group_member(7, "member-1", Some("member"), false)
        .expect("valid item");
    assert!(harness.resolver.resolve(&item).expect("resolve"));
    let report = harness.resolver.close().expect("close");
    assert_eq!(report.outcome(), RunOutcome::Succeeded);
    assert_eq!(
        harness.scalar("SELECT cityobject_id FROM group_to_cityobject WHERE cityobjectgroup_id = 7"),
        Some(1)
    );
}

#[rstest]
#[case(BUILDING_CLASS, true)]
#[case(FURNITURE_CLASS, false)]
fn reverse_patches_check_the_target_table(
    harness: Harness,
    #[case] class_id: i32,
    #[case] expected: bool,
) {
    harness
        .caches()
        .object()
        .put(CacheEntry::new("bldg", 1000, "building").with_object_class(class_id))
        .expect("register object");
    let item = DeferredReference::basic(
        42,
        "bldg",
        "building",
        BasicDirection::Reverse {
            column: "address_id".to_owned(),
        },
    )
    .expect("valid item");
    assert_eq!(harness.resolver.resolve(&item).expect("resolve"), expected);
    harness.resolver.close().expect("close");
    let address = harness.scalar("SELECT address_id FROM building WHERE id = 1000");
    assert_eq!(address, expected.then_some(42));
}

#[rstest]
fn unknown_classes_fall_back_to_the_mapping_tag(harness: Harness) {
    harness
        .caches()
        .object()
        .put(CacheEntry::new("bldg", 1000, "bridge").with_object_class(999))
        .expect("register object");
    let item = DeferredReference::basic(
        42,
        "bldg",
        "building",
        BasicDirection::Reverse {
            column: "address_id".to_owned(),
        },
    )
    .expect("valid item");
    assert!(!harness.resolver.resolve(&item).expect("resolve"));
}

#[rstest]
fn texture_files_are_loaded_from_the_base_dir(harness: Harness) {
    std::fs::write(harness.base_dir.join("roof.jpg"), [0xFF, 0xD8]).expect("write texture");
    let item = DeferredReference::texture_file(3, "roof.jpg").expect("valid item");
    assert!(harness.resolver.resolve(&item).expect("resolve"));
    harness.resolver.close().expect("close");
    let mime: Option<String> = harness
        .database()
        .lock()
        .query_row("SELECT tex_mime_type FROM tex_image WHERE id = 3", [], |row| {
            row.get(0)
        })
        .expect("read mime type");
    assert_eq!(mime.as_deref(), Some("image/jpeg"));
}

#[rstest]
#[case("missing.png")]
#[case("https://example.com/roof.png")]
fn unreachable_files_are_unresolved(harness: Harness, #[case] uri: &str) {
    let item = DeferredReference::texture_file(3, uri).expect("valid item");
    assert!(!harness.resolver.resolve(&item).expect("resolve"));
}

#[rstest]
fn batches_flush_at_the_configured_size() {
    let harness = harness_with(1000, 2);
    for key in 1..=3 {
        harness
            .caches()
            .object()
            .put(CacheEntry::new(format!("member-{key}"), key, "cityobject"))
            .expect("register member");
        let item = DeferredReference::group_member(7, &format!("member-{key}"), None, false)
            .expect("valid item");
        harness.resolver.resolve(&item).expect("resolve");
    }
    assert_eq!(harness.resolver.pending(ReferenceKind::GroupMember), 1);
    assert_eq!(
        harness.scalar("SELECT COUNT(*) FROM group_to_cityobject"),
        Some(2)
    );
}

#[rstest]
fn close_flushes_and_rejects_later_calls(harness: Harness) {
    harness
        .caches()
        .object()
        .put(CacheEntry::new("parent", 55, "cityobject"))
        .expect("register parent");
    let item = DeferredReference::group_member(7, "parent", None, true).expect("valid item");
    harness.resolver.resolve(&item).expect("resolve");
    let report = harness.resolver.close().expect("close");
    assert_eq!(report.resolved(ReferenceKind::GroupMember), 1);
    assert!(matches!(
        harness.resolver.resolve(&item),
        Err(ResolveError::Closed)
    ));
    assert!(matches!(harness.resolver.close(), Err(ResolveError::Closed)));
    assert_eq!(
        harness.scalar("SELECT parent_cityobject_id FROM cityobjectgroup WHERE id = 7"),
        Some(55)
    );
}

#[rstest]
fn failed_batches_stay_pending_while_other_kinds_are_written(harness: Harness) {
    let objects = harness.caches().object();
    objects
        .put(CacheEntry::new("parent", 55, "cityobject"))
        .expect("register parent");
    objects
        .put(CacheEntry::new("bldg", 1000, "building"))
        .expect("register building");
    harness
        .database()
        .lock()
        .execute_batch("DROP TABLE cityobjectgroup;")
        .expect("drop group table");

    let member = DeferredReference::group_member(7, "parent", None, true).expect("valid item");
    let basic = DeferredReference::basic(
        1000,
        "bldg",
        "building",
        BasicDirection::Forward {
            column: "address_id".to_owned(),
        },
    )
    .expect("valid item");
    assert!(harness.resolver.resolve(&member).expect("resolve member"));
    assert!(harness.resolver.resolve(&basic).expect("resolve basic"));

    let err = harness
        .resolver
        .execute_batch()
        .expect_err("group patch should fail");
    assert!(matches!(err, ResolveError::Sqlite { .. }));
    assert_eq!(harness.resolver.pending(ReferenceKind::GroupMember), 1);
    assert_eq!(harness.resolver.pending(ReferenceKind::Basic), 0);
    assert_eq!(
        harness.scalar("SELECT address_id FROM building WHERE id = 1000"),
        Some(1000)
    );

    harness
        .database()
        .lock()
        .execute_batch(
            "CREATE TABLE cityobjectgroup (id INTEGER PRIMARY KEY, parent_cityobject_id INTEGER);
             INSERT INTO cityobjectgroup (id) VALUES (7);",
        )
        .expect("restore group table");
    let report = harness.resolver.close().expect("close");
    assert_eq!(report.resolved(ReferenceKind::GroupMember), 1);
    assert_eq!(report.resolved(ReferenceKind::Basic), 1);
    assert_eq!(
        harness.scalar("SELECT parent_cityobject_id FROM cityobjectgroup WHERE id = 7"),
        Some(55)
    );
}

#[rstest]
fn patches_against_unknown_tables_stay_pending(harness: Harness) {
    harness
        .caches()
        .object()
        .put(CacheEntry::new("bldg", 1000, "building"))
        .expect("register building");
    let item = DeferredReference::basic(
        42,
        "bldg",
        "missing_table",
        BasicDirection::Forward {
            column: "address_id".to_owned(),
        },
    )
    .expect("valid item");
    assert!(harness.resolver.resolve(&item).expect("resolve"));
    let err = harness.resolver.close().expect_err("close should fail");
    assert!(matches!(err, ResolveError::Sqlite { .. }));
    assert_eq!(harness.resolver.pending(ReferenceKind::Basic), 1);
}

#[rstest]
fn pool_resolves_submitted_items_and_reports() {
    let harness = harness_with(1000, 3);
    for key in 1..=10 {
        harness
            .caches()
            .object()
            .put(CacheEntry::new(format!("member-{key}"), key, "cityobject"))
            .expect("register member");
    }
    let pool = ResolverPool::start(
        harness.resolver.context().clone(),
        citylink_core::PoolConfig {
            workers: 3,
            queue_size: 4,
        },
    )
    .expect("start pool");
    for key in 1..=12 {
        let item = DeferredReference::group_member(7, &format!("member-{key}"), None, false)
            .expect("valid item");
        pool.submit(item).expect("submit item");
    }
    let report = pool.finish().expect("finish pool");
    assert_eq!(report.resolved(ReferenceKind::GroupMember), 10);
    assert_eq!(
        report.outcome(),
        RunOutcome::SucceededWithWarnings { unresolved: 2 }
    );
    assert_eq!(
        harness.scalar("SELECT COUNT(*) FROM group_to_cityobject"),
        Some(10)
    );
}
