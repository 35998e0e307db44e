//! # chainstore
//!
//! An ordered key-value store persisted to a single append-mostly data
//! file. Records form an on-disk singly-linked list kept sorted by key:
//! - **Sorted zero-seek iteration**: range scans walk `next` links in key
//!   order without an auxiliary index.
//! - **Crash-atomic batch updates**: every commit is bracketed by a
//!   sentinel record and journaled in a side-car write-ahead log; reopening
//!   after a crash replays the last journal entry.
//! - **Snapshot reads**: each commit returns a monotonically increasing
//!   version; readers pin a version and see a consistent view while later
//!   commits land.
//! - **Persistent record cache**: hot record offsets survive restarts via
//!   a side-car cache file; a corrupt cache file is never fatal.
//!
//! ## Example Usage
//! ```rust
//! use chainstore::{Collection, WriteBatch, DEFAULT_CACHE_CAPACITY};
//! use tempfile::tempdir;
//!
//! let temp_dir = tempdir().expect("Failed to create temp dir");
//! let path = temp_dir.path().join("example.db");
//!
//! let collection = Collection::create(&path, DEFAULT_CACHE_CAPACITY).unwrap();
//!
//! // Stage and commit a batch atomically
//! let mut batch = WriteBatch::new();
//! batch.set("user:alice", "1");
//! batch.set("user:bob", "2");
//! let v1 = collection.update(&batch).unwrap();
//!
//! assert_eq!(
//!     collection.get(b"user:alice").unwrap().as_deref(),
//!     Some(b"1".as_slice())
//! );
//!
//! // Overwrite and delete in one commit
//! let mut batch = WriteBatch::new();
//! batch.set("user:alice", "9");
//! batch.delete("user:bob");
//! let v2 = collection.update(&batch).unwrap();
//! assert!(v2 > v1);
//!
//! // The old version still reads consistently
//! assert_eq!(
//!     collection.get_at(b"user:bob", v1).unwrap().as_deref(),
//!     Some(b"2".as_slice())
//! );
//! assert_eq!(collection.get(b"user:bob").unwrap(), None);
//!
//! // Ordered iteration
//! let keys: Vec<Vec<u8>> = collection
//!     .cursor()
//!     .unwrap()
//!     .map(|rec| rec.unwrap().key().to_vec())
//!     .collect();
//! assert_eq!(keys, vec![b"user:alice".to_vec()]);
//! ```
//!
//! ## Durability Notes
//! - A commit is durable once [`Collection::update`] returns; `close` adds
//!   no extra fsync.
//! - The write-ahead log append is the commit point: a crash before it
//!   rolls the batch back on reopen, a crash after it replays the patches.
//!
//! ## Concurrency Notes
//! - One writer at a time; concurrent readers block only while acquiring
//!   their snapshot version.
//! - Tombstoned records stay linked, so offsets held across commits remain
//!   valid.

pub mod store;
pub use store::*;

pub mod utils;
