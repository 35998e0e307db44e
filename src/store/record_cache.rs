use crate::store::Stats;
use crate::store::constants::*;
use crate::store::record::Record;
use rand::Rng;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Bounded offset → record map that accelerates predecessor search.
///
/// The cache has two parts: a bounded map admitted probabilistically, and a
/// single distinguished `max_key` slot holding the cached record with the
/// largest known key. Predecessor search relies primarily on the `max_key`
/// fast path (sequential, ascending-key workloads jump straight to the
/// list tail), while the bounded map is an auxiliary hint for everything
/// else. Hints are advisory: callers confirm the true predecessor by walking
/// `next` links on disk.
///
/// ## Admission
/// Every read offers the record via [`push`](Self::push): a new largest key
/// replaces the `max_key` slot unconditionally; otherwise the record enters
/// the bounded map: always while under capacity, with probability 1% once
/// full. Eviction picks an arbitrary victim (map iteration order), never the
/// `max_key` offset, and is suppressed entirely while `prevent_purge` is set
/// during the critical section of an update.
///
/// ## Persistence
/// The cache owns a side-car file holding a plain concatenation of
/// little-endian i64 offsets. After every `4 × capacity` admissions the file
/// is rewritten from scratch and fsynced. On reopen the stored offsets are
/// loaded back through the collection's record loader; a corrupt or torn
/// file is never fatal: it is truncated and operation proceeds cold.
#[derive(Debug)]
pub(crate) struct RecordCache {
    map: HashMap<i64, Arc<Record>>,
    max_key: Option<Arc<Record>>,
    capacity: usize,
    prevent_purge: bool,
    admissions: usize,
    file: File,
    path: PathBuf,
    stats: Arc<Stats>,
}

impl RecordCache {
    /// Opens (or creates) the side-car offset file at `path`.
    pub fn open(path: &Path, capacity: usize, stats: Arc<Stats>) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            map: HashMap::new(),
            max_key: None,
            capacity: capacity.max(1),
            prevent_purge: false,
            admissions: 0,
            file,
            path: path.to_path_buf(),
            stats,
        })
    }

    /// Reads back the persisted offset list.
    ///
    /// A trailing partial slot (file length not a multiple of 8) is
    /// truncated away; an unreadable file is truncated to zero. Neither is
    /// fatal: the cache simply starts cold.
    pub fn stored_offsets(&mut self) -> Vec<i64> {
        let mut buf = Vec::new();
        if let Err(e) = self
            .file
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.file.read_to_end(&mut buf))
        {
            warn!(
                "Cache file {} unreadable ({e}); starting cold",
                self.path.display()
            );
            let _ = self.file.set_len(0);
            return Vec::new();
        }

        let valid = buf.len() - buf.len() % CACHE_SLOT_SIZE;
        if valid < buf.len() {
            warn!(
                "Truncating torn cache file {} from {} to {} bytes",
                self.path.display(),
                buf.len(),
                valid
            );
            let _ = self.file.set_len(valid as u64).and_then(|_| self.file.sync_all());
        }

        buf[..valid]
            .chunks_exact(CACHE_SLOT_SIZE)
            .map(|chunk| i64::from_le_bytes(chunk.try_into().unwrap()))
            .collect()
    }

    /// Looks up a cached record, checking the `max_key` slot as well as the
    /// bounded map. Bumps the hit/miss counters.
    pub fn get(&self, offset: i64) -> Option<Arc<Record>> {
        let found = self
            .map
            .get(&offset)
            .or_else(|| {
                self.max_key
                    .as_ref()
                    .filter(|rec| rec.offset() == offset)
            })
            .cloned();

        match found {
            Some(rec) => {
                self.stats.incr_cache_hits();
                Some(rec)
            }
            None => {
                self.stats.incr_cache_misses();
                None
            }
        }
    }

    /// Offers a record read from disk.
    pub fn push(&mut self, rec: &Arc<Record>) {
        if self
            .max_key
            .as_ref()
            .is_none_or(|mk| rec.key() > mk.key())
        {
            self.max_key = Some(Arc::clone(rec));
            self.note_admission();
            return;
        }

        if self.map.len() >= self.capacity && !rand::rng().random_ratio(1, 100) {
            return;
        }

        self.map.insert(rec.offset(), Arc::clone(rec));
        self.note_admission();
        self.purge();
    }

    /// Unconditional insert, ignoring capacity. Used for records the update
    /// engine is actively modifying; the over-capacity map is purged back
    /// down when the batch releases it.
    pub fn force_push(&mut self, rec: Arc<Record>) {
        if self
            .max_key
            .as_ref()
            .is_none_or(|mk| rec.key() > mk.key())
        {
            self.max_key = Some(Arc::clone(&rec));
        }
        self.map.insert(rec.offset(), rec);
        self.note_admission();
    }

    /// Advisory predecessor hint: the offset of the cached record with the
    /// largest key strictly less than `key`, or 0 if none is cached.
    pub fn find_last_less_than(&self, key: &[u8]) -> i64 {
        if let Some(mk) = &self.max_key
            && mk.key() < key
        {
            return mk.offset();
        }

        let mut best: Option<&Arc<Record>> = None;
        for rec in self.map.values() {
            if rec.key() < key
                && best.is_none_or(|b| (rec.key(), rec.offset()) > (b.key(), b.offset()))
            {
                best = Some(rec);
            }
        }
        best.map_or(0, |rec| rec.offset())
    }

    pub fn set_prevent_purge(&mut self, prevent: bool) {
        self.prevent_purge = prevent;
    }

    /// Evicts arbitrary victims until the map is back at capacity, skipping
    /// the current `max_key` offset. A no-op while `prevent_purge` is set.
    pub fn purge(&mut self) {
        if self.prevent_purge {
            return;
        }

        let protected = self.max_key.as_ref().map(|rec| rec.offset());
        while self.map.len() > self.capacity {
            let victim = self
                .map
                .keys()
                .find(|&&offset| Some(offset) != protected)
                .copied();
            match victim {
                Some(offset) => {
                    self.map.remove(&offset);
                }
                None => break,
            }
        }
    }

    fn note_admission(&mut self) {
        self.admissions += 1;
        if self.admissions >= 4 * self.capacity {
            self.admissions = 0;
            self.persist();
        }
    }

    /// Rewrites the side-car file with the current offset set. Failure is
    /// logged and the file truncated; persistence is an optimization, not a
    /// durability requirement.
    fn persist(&mut self) {
        let mut buf =
            Vec::with_capacity((self.map.len() + 1) * CACHE_SLOT_SIZE);
        if let Some(mk) = &self.max_key {
            buf.extend_from_slice(&mk.offset().to_le_bytes());
        }
        for &offset in self.map.keys() {
            buf.extend_from_slice(&offset.to_le_bytes());
        }

        let result = self
            .file
            .set_len(0)
            .and_then(|_| self.file.seek(SeekFrom::Start(0)))
            .and_then(|_| self.file.write_all(&buf))
            .and_then(|_| self.file.sync_all());

        match result {
            Ok(()) => debug!(
                "Persisted {} cache offsets to {}",
                buf.len() / CACHE_SLOT_SIZE,
                self.path.display()
            ),
            Err(e) => {
                warn!(
                    "Failed to persist cache file {} ({e}); truncating",
                    self.path.display()
                );
                let _ = self.file.set_len(0);
            }
        }
    }
}
