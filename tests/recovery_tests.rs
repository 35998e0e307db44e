//! Crash recovery: the write-ahead log append is the commit point. A crash
//! before it rolls the batch back on reopen; a crash after it replays the
//! journaled patches. Crashes are simulated with the debug-build stop
//! hooks plus direct corruption of the files.

use chainstore::{Collection, DEFAULT_CACHE_CAPACITY, Error, WriteBatch};
use std::fs::{self, OpenOptions};
use std::io::Write;
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

fn live_pairs(collection: &Collection) -> Vec<(Vec<u8>, Vec<u8>)> {
    collection
        .cursor()
        .expect("Failed to build cursor")
        .map(|rec| {
            let rec = rec.expect("Failed to read record");
            (rec.key().to_vec(), rec.value().to_vec())
        })
        .collect()
}

fn mixed_batch() -> WriteBatch {
    let mut batch = WriteBatch::new();
    batch.set("c", "3");
    batch.set("a", "9");
    batch.delete("b");
    batch
}

fn seed_base_state(collection: &Collection) -> i64 {
    let mut batch = WriteBatch::new();
    batch.set("a", "0");
    batch.set("b", "2");
    collection.update(&batch).expect("Failed to commit batch")
}

#[test]
fn test_crash_after_wal_replays_to_committed_state() {
    let (_dir, path, collection) = create_temp_collection();
    seed_base_state(&collection);

    // Journaled but never applied: the commit must survive the crash.
    let v5 = collection
        .update_stop_after_wal(&mixed_batch())
        .expect("Simulated crash should report the staged version");

    // The in-memory view is gone until reopen.
    assert!(matches!(collection.get(b"a"), Err(Error::Internal)));
    assert!(matches!(
        collection.update(&WriteBatch::new()),
        Err(Error::Internal)
    ));
    drop(collection);

    let collection = reopen(&path);
    assert_eq!(
        collection.version().expect("Failed to read version"),
        v5,
        "Recovery must land on the journaled commit"
    );
    assert_eq!(
        live_pairs(&collection),
        vec![
            (b"a".to_vec(), b"9".to_vec()),
            (b"c".to_vec(), b"3".to_vec()),
        ],
        "Recovered state must match the committed batch"
    );
}

#[test]
fn test_crash_after_append_rolls_batch_back() {
    let (_dir, path, collection) = create_temp_collection();
    let v_before = seed_base_state(&collection);
    let pairs_before = live_pairs(&collection);

    // Appended and fsynced but never journaled: the batch never happened.
    collection
        .update_stop_after_append(&mixed_batch())
        .expect("Simulated crash should succeed up to the append");
    drop(collection);

    let file_len_before_recovery = fs::metadata(&path)
        .expect("Failed to stat data file")
        .len();
    assert!(
        file_len_before_recovery > v_before as u64,
        "The torn append should still be on disk before recovery"
    );

    let collection = reopen(&path);
    assert_eq!(
        collection.version().expect("Failed to read version"),
        v_before,
        "Recovery must roll back to the prior commit"
    );
    assert_eq!(live_pairs(&collection), pairs_before);
    assert_eq!(
        fs::metadata(&path).expect("Failed to stat data file").len(),
        v_before as u64,
        "The torn append must be truncated away"
    );

    // The rolled-back collection accepts the batch again.
    let v5 = collection
        .update(&mixed_batch())
        .expect("Failed to commit batch after recovery");
    assert!(v5 > v_before);
    assert_eq!(
        live_pairs(&collection),
        vec![
            (b"a".to_vec(), b"9".to_vec()),
            (b"c".to_vec(), b"3".to_vec()),
        ]
    );
}

#[test]
fn test_torn_wal_tail_is_discarded() {
    let (_dir, path, collection) = create_temp_collection();
    seed_base_state(&collection);
    let v_before = collection.version().expect("Failed to read version");
    let pairs_before = live_pairs(&collection);
    drop(collection);

    // Garbage after the last complete entry looks like a torn append.
    let wal_path = path.with_extension("db.wal");
    let mut wal = OpenOptions::new()
        .append(true)
        .open(&wal_path)
        .expect("Failed to open WAL file");
    wal.write_all(b"torn-entry-garbage")
        .expect("Failed to append garbage");
    wal.sync_all().expect("Failed to sync WAL file");
    drop(wal);

    let collection = reopen(&path);
    assert_eq!(
        collection.version().expect("Failed to read version"),
        v_before,
        "A torn WAL tail must not change committed state"
    );
    assert_eq!(live_pairs(&collection), pairs_before);
    assert_eq!(
        fs::metadata(&wal_path).expect("Failed to stat WAL").len(),
        0,
        "The torn log is discarded entirely"
    );
}

#[test]
fn test_torn_data_append_without_sentinel_is_truncated() {
    let (_dir, path, collection) = create_temp_collection();
    seed_base_state(&collection);
    let v_before = collection.version().expect("Failed to read version");
    let pairs_before = live_pairs(&collection);
    drop(collection);

    // A crash mid-append leaves bytes past the last sentinel.
    let mut data = OpenOptions::new()
        .append(true)
        .open(&path)
        .expect("Failed to open data file");
    data.write_all(&[0xAB; 37]).expect("Failed to append garbage");
    data.sync_all().expect("Failed to sync data file");
    drop(data);

    let collection = reopen(&path);
    assert_eq!(collection.version().expect("Failed to read version"), v_before);
    assert_eq!(live_pairs(&collection), pairs_before);
    assert_eq!(
        fs::metadata(&path).expect("Failed to stat data file").len(),
        v_before as u64
    );
}

#[test]
fn test_replay_is_idempotent_across_reopens() {
    let (_dir, path, collection) = create_temp_collection();
    seed_base_state(&collection);
    collection.update(&mixed_batch()).expect("Failed to commit");
    drop(collection);

    let bytes_after_first_close = fs::read(&path).expect("Failed to read data file");

    // Each reopen replays the last WAL entry again.
    let collection = reopen(&path);
    let pairs = live_pairs(&collection);
    drop(collection);
    let bytes_after_second_close = fs::read(&path).expect("Failed to read data file");

    assert_eq!(
        bytes_after_first_close, bytes_after_second_close,
        "Replaying a committed entry must rewrite identical bytes"
    );

    let collection = reopen(&path);
    assert_eq!(live_pairs(&collection), pairs);
}

#[test]
fn test_recovered_collection_resumes_normal_service() {
    let (_dir, path, collection) = create_temp_collection();
    seed_base_state(&collection);
    collection
        .update_stop_after_wal(&mixed_batch())
        .expect("Simulated crash failed");
    drop(collection);

    let collection = reopen(&path);
    let mut batch = WriteBatch::new();
    batch.set("d", "4");
    let version = collection
        .update(&batch)
        .expect("Recovered collection should accept updates");
    assert_eq!(
        collection
            .get_at(b"d", version)
            .expect("Failed to read key")
            .as_deref(),
        Some(b"4".as_slice())
    );
}
