//! Data and versions must survive close/reopen cycles unchanged.

use chainstore::{Collection, DEFAULT_CACHE_CAPACITY, WriteBatch};
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn create_temp_collection() -> (tempfile::TempDir, PathBuf, Collection) {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("test_collection.db");
    let collection =
        Collection::create(&path, DEFAULT_CACHE_CAPACITY).expect("Failed to create collection");
    (dir, path, collection)
}

fn reopen(path: &Path) -> Collection {
    Collection::open(path, DEFAULT_CACHE_CAPACITY).expect("Failed to reopen collection")
}

#[test]
fn test_data_survives_reopen() {
    let (_dir, path, collection) = create_temp_collection();

    let mut batch = WriteBatch::new();
    batch.set("alpha", "1");
    batch.set("bravo", "2");
    collection.update(&batch).expect("Failed to commit batch");

    let mut batch = WriteBatch::new();
    batch.set("bravo", "22");
    batch.delete("alpha");
    let version = collection.update(&batch).expect("Failed to commit batch");
    drop(collection);

    let collection = reopen(&path);
    assert_eq!(
        collection.version().expect("Failed to read version"),
        version,
        "Version must survive reopen"
    );
    assert_eq!(collection.get(b"alpha").expect("Failed to read key"), None);
    assert_eq!(
        collection
            .get(b"bravo")
            .expect("Failed to read key")
            .as_deref(),
        Some(b"22".as_slice())
    );
}

#[test]
fn test_snapshots_survive_reopen() {
    let (_dir, path, collection) = create_temp_collection();

    let mut batch = WriteBatch::new();
    batch.set("k", "one");
    let v1 = collection.update(&batch).expect("Failed to commit batch");

    let mut batch = WriteBatch::new();
    batch.set("k", "two");
    collection.update(&batch).expect("Failed to commit batch");
    drop(collection);

    let collection = reopen(&path);
    assert_eq!(
        collection
            .get_at(b"k", v1)
            .expect("Failed to read at version")
            .as_deref(),
        Some(b"one".as_slice()),
        "Historical snapshots remain readable after reopen"
    );
}

#[test]
fn test_updates_continue_after_reopen() {
    let (_dir, path, collection) = create_temp_collection();

    let mut batch = WriteBatch::new();
    batch.set("a", "1");
    let v1 = collection.update(&batch).expect("Failed to commit batch");
    drop(collection);

    let collection = reopen(&path);
    let mut batch = WriteBatch::new();
    batch.set("b", "2");
    let v2 = collection.update(&batch).expect("Failed to commit batch");
    assert!(v2 > v1, "Versions keep increasing across reopen");
    drop(collection);

    let collection = reopen(&path);
    let pairs: Vec<(Vec<u8>, Vec<u8>)> = collection
        .cursor()
        .expect("Failed to build cursor")
        .map(|rec| {
            let rec = rec.expect("Failed to read record");
            (rec.key().to_vec(), rec.value().to_vec())
        })
        .collect();
    assert_eq!(
        pairs,
        vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
        ]
    );
}

#[test]
fn test_large_values_survive_reopen() {
    let (_dir, path, collection) = create_temp_collection();

    let value = vec![0x5A; 64 * 1024];
    let mut batch = WriteBatch::new();
    batch.set("large", value.clone());
    collection.update(&batch).expect("Failed to commit batch");
    drop(collection);

    let collection = reopen(&path);
    assert_eq!(
        collection.get(b"large").expect("Failed to read key"),
        Some(value)
    );
}

#[test]
fn test_reopen_with_different_cache_capacity() {
    let (_dir, path, collection) = create_temp_collection();

    let mut batch = WriteBatch::new();
    for i in 0..30 {
        batch.set(format!("key{:02}", i), format!("{}", i));
    }
    collection.update(&batch).expect("Failed to commit batch");
    drop(collection);

    let collection = Collection::open(&path, 2).expect("Failed to reopen collection");
    for i in 0..30 {
        assert_eq!(
            collection
                .get(format!("key{:02}", i).as_bytes())
                .expect("Failed to read key")
                .as_deref(),
            Some(format!("{}", i).as_bytes())
        );
    }
}
