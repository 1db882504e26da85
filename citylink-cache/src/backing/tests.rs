//! Unit tests for the partitioned backing store.

use super::*;
use camino::Utf8PathBuf;
use citylink_core::test_support::{sample_entries, sample_entry};
use rstest::{fixture, rstest};
use tempfile::TempDir;

fn config(partitions: usize, batch_size: usize, location: BackingLocation) -> CacheConfig {
    CacheConfig {
        capacity: 16,
        partitions,
        batch_size,
        location,
        ..CacheConfig::default()
    }
}

fn candidates(entries: Vec<CacheEntry>) -> Vec<DrainCandidate> {
    entries
        .into_iter()
        .map(|entry| DrainCandidate {
            entry,
            requested: false,
        })
        .collect()
}

#[fixture]
fn memory_store() -> PartitionedStore {
    PartitionedStore::new(CacheFlavor::Object, &config(4, 3, BackingLocation::InMemory))
        .expect("create in-memory store")
}

#[rstest]
fn partitions_are_materialised_lazily(memory_store: PartitionedStore) {
    assert_eq!(memory_store.materialised_partitions(), 0);
    let entry = sample_entry(CacheFlavor::Object, 1);
    let index = memory_store.partition_for(&entry.external_id);
    memory_store
        .drain_to_db(&candidates(vec![entry]), 1)
        .expect("drain one entry");
    let expected = if index == 0 { 1 } else { 2 };
    assert_eq!(memory_store.materialised_partitions(), expected);
}

#[rstest]
fn drained_entries_round_trip_through_lookup(memory_store: PartitionedStore) {
    let entries = sample_entries(CacheFlavor::Object, 10);
    let written = memory_store
        .drain_to_db(&candidates(entries.clone()), entries.len())
        .expect("drain entries");
    assert_eq!(written, 10);
    for entry in &entries {
        let found = memory_store
            .lookup(&entry.external_id)
            .expect("lookup entry");
        assert_eq!(found.as_ref(), Some(entry));
    }
    assert_eq!(memory_store.lookup("unknown").expect("lookup miss"), None);
}

#[rstest]
fn geometry_entries_keep_roots_and_orientation() {
    let store = PartitionedStore::new(
        CacheFlavor::Geometry,
        &config(2, 1000, BackingLocation::InMemory),
    )
    .expect("create geometry store");
    let entry = CacheEntry::new("ring-7", 70, "surface_geometry")
        .with_root(7)
        .reversed(true);
    store
        .drain_to_db(&candidates(vec![entry.clone()]), 1)
        .expect("drain geometry");
    assert_eq!(store.lookup("ring-7").expect("lookup geometry"), Some(entry));
}

#[rstest]
fn drain_honours_count_and_requested_first(memory_store: PartitionedStore) {
    let mut offered = candidates(sample_entries(CacheFlavor::Object, 4));
    if let Some(last) = offered.last_mut() {
        last.requested = true;
    }
    let written = memory_store.drain_to_db(&offered, 2).expect("drain two");
    assert_eq!(written, 2);
    let persisted: Vec<bool> = offered
        .iter()
        .map(|candidate| {
            memory_store
                .lookup(&candidate.entry.external_id)
                .expect("lookup candidate")
                .is_some()
        })
        .collect();
    assert_eq!(persisted, [true, false, false, true]);
}

#[rstest]
fn partition_selection_is_deterministic() {
    let first = PartitionedStore::new(CacheFlavor::Object, &config(7, 10, BackingLocation::InMemory))
        .expect("first store");
    let second =
        PartitionedStore::new(CacheFlavor::Geometry, &config(7, 10, BackingLocation::InMemory))
            .expect("second store");
    for seed in 0..200 {
        let id = format!("gml-{seed}");
        let index = first.partition_for(&id);
        assert!(index < 7);
        assert_eq!(index, first.partition_for(&id));
        assert_eq!(index, second.partition_for(&id));
    }
}

#[rstest]
fn directory_location_writes_one_file_per_partition() {
    let dir = TempDir::new().expect("create temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().join("spill")).expect("utf8 path");
    let store = PartitionedStore::new(
        CacheFlavor::Object,
        &config(3, 2, BackingLocation::Directory(root.clone())),
    )
    .expect("create directory store");
    let entries = sample_entries(CacheFlavor::Object, 30);
    store
        .drain_to_db(&candidates(entries), 30)
        .expect("drain entries");
    for index in 0..store.materialised_partitions() {
        assert!(root.join(format!("object_id_cache_{index}.sqlite")).is_file());
    }
}

#[rstest]
fn close_rejects_later_calls(memory_store: PartitionedStore) {
    memory_store
        .drain_to_db(&candidates(sample_entries(CacheFlavor::Object, 2)), 2)
        .expect("drain entries");
    memory_store.close().expect("close store");
    assert!(matches!(
        memory_store.lookup("object_id_cache-1"),
        Err(BackingStoreError::Closed)
    ));
    assert!(matches!(memory_store.close(), Err(BackingStoreError::Closed)));
}

#[rstest]
fn rejects_invalid_configuration() {
    let err = PartitionedStore::new(CacheFlavor::Object, &config(0, 10, BackingLocation::InMemory))
        .expect_err("zero partitions");
    assert!(matches!(err, BackingStoreError::Config(_)));
}

#[cfg(unix)]
#[rstest]
fn error_paths_keep_non_utf8_directories_readable() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let path = Path::new(OsStr::from_bytes(b"/tmp/spill-\xFF"));
    assert_eq!(lossy_utf8(path), Utf8PathBuf::from("/tmp/spill-\u{FFFD}"));
}
