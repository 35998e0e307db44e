//! Randomized batch sequences checked against a reference model: the final
//! live key set equals the set-theoretic reduction of the batches, walks
//! stay sorted, versions stay monotonic, and historical snapshots keep
//! reading what they read when they were current.

use chainstore::{Collection, DEFAULT_CACHE_CAPACITY, WriteBatch};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serial_test::serial;
use std::collections::BTreeMap;
use tempfile::tempdir;

type Model = BTreeMap<Vec<u8>, Vec<u8>>;

fn key_pool() -> Vec<Vec<u8>> {
    (0..40).map(|i| format!("key{:02}", i).into_bytes()).collect()
}

/// Builds one random batch and mirrors its staged operations (last-op-wins)
/// into `staged`.
fn random_batch(rng: &mut StdRng, pool: &[Vec<u8>]) -> (WriteBatch, BTreeMap<Vec<u8>, Option<Vec<u8>>>) {
    let mut batch = WriteBatch::new();
    let mut staged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();

    let ops = rng.random_range(1..=8);
    for _ in 0..ops {
        let key = pool[rng.random_range(0..pool.len())].clone();
        if rng.random_bool(0.25) {
            batch.delete(key.clone());
            staged.insert(key, None);
        } else {
            let value = format!("v{}", rng.random_range(0..10_000)).into_bytes();
            batch.set(key.clone(), value.clone());
            staged.insert(key, Some(value));
        }
    }
    (batch, staged)
}

fn apply_staged(model: &mut Model, staged: &BTreeMap<Vec<u8>, Option<Vec<u8>>>) {
    for (key, op) in staged {
        match op {
            Some(value) => {
                model.insert(key.clone(), value.clone());
            }
            None => {
                model.remove(key);
            }
        }
    }
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

#[test]
#[serial]
fn test_random_batches_match_reference_model() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("property.db");
    let collection =
        Collection::create(&path, DEFAULT_CACHE_CAPACITY).expect("Failed to create collection");

    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let pool = key_pool();
    let mut model = Model::new();
    let mut last_version = collection.version().expect("Failed to read version");
    let mut checkpoints: Vec<(i64, Model)> = Vec::new();

    for round in 0..60 {
        let (batch, staged) = random_batch(&mut rng, &pool);
        let version = collection.update(&batch).expect("Failed to commit batch");
        assert!(
            version > last_version,
            "Round {}: version {} did not advance past {}",
            round,
            version,
            last_version
        );
        last_version = version;
        apply_staged(&mut model, &staged);

        if round % 10 == 9 {
            checkpoints.push((version, model.clone()));
        }

        // The walk stays sorted and matches the model after every commit.
        let pairs = live_pairs(&collection);
        let mut sorted = pairs.clone();
        sorted.sort();
        assert_eq!(pairs, sorted, "Round {}: walk out of order", round);
        let expected: Vec<(Vec<u8>, Vec<u8>)> =
            model.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        assert_eq!(pairs, expected, "Round {}: walk diverged from model", round);
    }

    // Historical snapshots still read as they did when current.
    for (version, snapshot_model) in &checkpoints {
        for key in &pool {
            let got = collection
                .get_at(key, *version)
                .expect("Failed to read at version");
            assert_eq!(
                got.as_deref(),
                snapshot_model.get(key).map(Vec::as_slice),
                "Snapshot at version {} diverged for key {:?}",
                version,
                String::from_utf8_lossy(key)
            );
        }
    }

    assert_eq!(
        collection.stats().updates,
        60,
        "Every non-empty batch counts one update"
    );

    // Durability: everything holds after a reopen.
    drop(collection);
    let collection =
        Collection::open(&path, DEFAULT_CACHE_CAPACITY).expect("Failed to reopen collection");
    let expected: Vec<(Vec<u8>, Vec<u8>)> =
        model.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    assert_eq!(live_pairs(&collection), expected);
    for (version, snapshot_model) in &checkpoints {
        for key in &pool {
            let got = collection
                .get_at(key, *version)
                .expect("Failed to read at version");
            assert_eq!(got.as_deref(), snapshot_model.get(key).map(Vec::as_slice));
        }
    }
}

#[test]
#[serial]
fn test_random_batches_with_tiny_cache() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("property_tiny_cache.db");
    let collection = Collection::create(&path, 2).expect("Failed to create collection");

    let mut rng = StdRng::seed_from_u64(0xBADC0DE);
    let pool = key_pool();
    let mut model = Model::new();

    for _ in 0..40 {
        let (batch, staged) = random_batch(&mut rng, &pool);
        collection.update(&batch).expect("Failed to commit batch");
        apply_staged(&mut model, &staged);
    }

    let expected: Vec<(Vec<u8>, Vec<u8>)> =
        model.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    assert_eq!(
        live_pairs(&collection),
        expected,
        "Constant cache churn must not affect results"
    );
    for key in &pool {
        assert_eq!(
            collection.get(key).expect("Failed to read key"),
            model.get(key).cloned()
        );
    }
}
