use crate::store::constants::*;
use crate::store::cursor::Cursor;
use crate::store::errors::{Error, Result};
use crate::store::record::{FileHeader, Record, RecordHeader, Sentinel};
use crate::store::record_cache::RecordCache;
use crate::store::stats::{Stats, StatsSnapshot};
use crate::store::wal::{Wal, WalEntry};
use crate::store::write_batch::WriteBatch;
use crate::utils::sidecar_path;
use memmap2::Mmap;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// Ordered key-value collection backed by a single append-mostly data file.
///
/// Records form an on-disk singly-linked list kept sorted by key: inserts
/// allocate new records at the file tail and relink predecessors in place;
/// deletes and overwrites tombstone the superseded record with the commit
/// version that removed it. Every batch is bracketed by a sentinel record
/// and journaled as a group of byte-level patches in a side-car write-ahead
/// log, which makes multi-key updates crash-atomic: reopening after any
/// failure replays the last logged patch group and truncates torn appends.
///
/// One writer at a time may run [`update`](Self::update); any number of
/// concurrent readers walk the record chain against a snapshot version,
/// blocking only for the brief header read that acquires the snapshot.
pub struct Collection {
    path: PathBuf,
    wal_path: PathBuf,
    cache_path: PathBuf,

    file: Mutex<File>,
    wal: Mutex<Wal>,
    mmap: Mutex<Arc<Mmap>>,

    // Gate between the single writer and snapshot acquisition. `head` and
    // `last_commit` mirror the on-disk file header and are only stored while
    // the write half is held.
    meta_lock: RwLock<()>,
    head: AtomicI64,
    last_commit: AtomicI64,

    cache: RwLock<RecordCache>,
    stats: Arc<Stats>,

    // 0 = healthy; 1 = in-memory view no longer matches the files
    internal_state: AtomicU32,
}

/// Staged header mutation for an on-disk record, applied at patch time.
#[derive(Debug, Clone, Copy)]
struct DirtyRecord {
    next: i64,
    deleted: i64,
    key_len: u16,
    val_len: u32,
}

impl DirtyRecord {
    fn from_record(rec: &Record) -> Self {
        let header = rec.header();
        Self {
            next: header.next,
            deleted: header.deleted,
            key_len: header.key_len,
            val_len: header.val_len,
        }
    }

    fn header(&self) -> RecordHeader {
        RecordHeader {
            next: self.next,
            deleted: self.deleted,
            key_len: self.key_len,
            val_len: self.val_len,
        }
    }
}

/// Record staged for appending, before serialization into the batch buffer.
#[derive(Debug)]
struct NewRecord {
    offset: i64,
    key: Vec<u8>,
    value: Vec<u8>,
    next: i64,
}

/// How far [`Collection::commit_batch`] runs before returning. Anything
/// other than `Full` simulates a crash for recovery tests and leaves the
/// collection in the inconsistent state a real crash would.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(not(any(test, debug_assertions)), allow(dead_code))]
enum StopPoint {
    Full,
    AfterAppend,
    AfterWal,
}

/// Clears `prevent_purge` and shrinks the cache back to capacity when a
/// batch releases its pinned predecessors, on success and error paths alike.
struct PurgeGuard<'a> {
    collection: &'a Collection,
}

impl Drop for PurgeGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut cache) = self.collection.cache.write() {
            cache.set_prevent_purge(false);
            cache.purge();
        }
    }
}

impl Collection {
    /// Creates a fresh collection at `path`, truncating any existing files.
    ///
    /// Writes the empty file header (`head = 0`, `last_commit = 16`), fsyncs,
    /// creates empty `.wal` and `.cache` side-cars, then opens normally.
    pub fn create(path: &Path, cache_capacity: usize) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let header = FileHeader {
            head: 0,
            last_commit: FILE_HEADER_SIZE as i64,
        };
        file.write_all(&header.serialize())?;
        file.sync_all()?;
        drop(file);

        for sidecar in [sidecar_path(path, "wal"), sidecar_path(path, "cache")] {
            let sidecar_file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&sidecar)?;
            sidecar_file.sync_all()?;
        }

        Self::open(path, cache_capacity)
    }

    /// Opens an existing collection, running write-ahead log recovery first.
    ///
    /// A missing data file is [`Error::DoesNotExist`]. Recovery replays the
    /// last well-formed WAL entry (idempotent: a fully committed batch is
    /// rewritten byte-identically), truncates the data file to its last
    /// commit to discard torn appends, and validates the commit boundary
    /// sentinel. The persisted cache-offset file is then loaded back; cache
    /// corruption is never fatal.
    pub fn open(path: &Path, cache_capacity: usize) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::DoesNotExist(path.to_path_buf()));
        }

        let wal_path = sidecar_path(path, "wal");
        let cache_path = sidecar_path(path, "cache");

        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut wal = Wal::open(&wal_path)?;

        let header = Self::recover(&mut file, &mut wal, path)?;

        let mmap = Self::init_mmap(&file)?;
        let stats = Arc::new(Stats::default());
        let cache = RecordCache::open(&cache_path, cache_capacity, Arc::clone(&stats))?;

        let collection = Self {
            path: path.to_path_buf(),
            wal_path,
            cache_path,
            file: Mutex::new(file),
            wal: Mutex::new(wal),
            mmap: Mutex::new(Arc::new(mmap)),
            meta_lock: RwLock::new(()),
            head: AtomicI64::new(header.head),
            last_commit: AtomicI64::new(header.last_commit),
            cache: RwLock::new(cache),
            stats,
            internal_state: AtomicU32::new(0),
        };

        collection.warm_cache();

        Ok(collection)
    }

    /// Replays the last WAL entry (or discards a torn one), truncates the
    /// data file to `last_commit`, and fsyncs both files.
    fn recover(file: &mut File, wal: &mut Wal, path: &Path) -> Result<FileHeader> {
        let mut header = Self::read_file_header(file)?;
        let file_len = file.metadata()?.len();

        match wal.read_last_entry() {
            Ok(entry) => {
                debug!(
                    "Replaying last write-ahead log entry ({} patches)",
                    entry.records.len()
                );
                for rec in &entry.records {
                    if rec.offset < 0
                        || rec.offset as u64 + rec.data.len() as u64 > file_len
                    {
                        return Err(Error::Corrupt(format!(
                            "write-ahead log patch at offset {} exceeds data file bounds",
                            rec.offset
                        )));
                    }
                    file.seek(SeekFrom::Start(rec.offset as u64))?;
                    file.write_all(&rec.data)?;
                }
                header = Self::read_file_header(file)?;
            }
            Err(e) => {
                debug!("No replayable write-ahead log entry ({e})");
                wal.truncate()?;
            }
        }

        if header.last_commit < FILE_HEADER_SIZE as i64 {
            return Err(Error::Corrupt(format!(
                "file header of {} places the last commit inside the header",
                path.display()
            )));
        }
        if header.last_commit as u64 > file_len {
            return Err(Error::Corrupt(format!(
                "data file {} is shorter than its last commit",
                path.display()
            )));
        }
        if (header.last_commit as u64) < file_len {
            warn!(
                "Truncating data file {} from {} to {} bytes",
                path.display(),
                file_len,
                header.last_commit
            );
            file.set_len(header.last_commit as u64)?;
        }

        file.sync_all()?;
        wal.sync()?;

        if header.last_commit > FILE_HEADER_SIZE as i64 {
            Self::verify_sentinel(file, header.last_commit)?;
        }

        Ok(header)
    }

    fn read_file_header(file: &mut File) -> Result<FileHeader> {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut buf)?;
        Ok(FileHeader::deserialize(&buf))
    }

    /// The byte at `last_commit - 12` must begin a sentinel whose stored
    /// offset agrees with the commit boundary.
    fn verify_sentinel(file: &mut File, last_commit: i64) -> Result<()> {
        let mut buf = [0u8; SENTINEL_SIZE];
        file.seek(SeekFrom::Start((last_commit - SENTINEL_SIZE as i64) as u64))?;
        file.read_exact(&mut buf)?;

        let sentinel = Sentinel::deserialize(&buf);
        if sentinel.magic != SENTINEL_MAGIC
            || sentinel.offset + SENTINEL_SIZE as i64 != last_commit
        {
            return Err(Error::Corrupt(
                "commit boundary does not terminate with a sentinel".to_string(),
            ));
        }
        Ok(())
    }

    fn init_mmap(file: &File) -> std::io::Result<Mmap> {
        unsafe { memmap2::MmapOptions::new().map(file) }
    }

    /// Loads the persisted cache offsets back through the record loader.
    /// Stale or garbled offsets are skipped; the cache warms lazily either
    /// way.
    fn warm_cache(&self) {
        let offsets = match self.cache.write() {
            Ok(mut cache) => cache.stored_offsets(),
            Err(_) => return,
        };
        if offsets.is_empty() {
            return;
        }

        let last_commit = self.last_commit.load(Ordering::Acquire);
        let mut restored = 0usize;
        for offset in offsets {
            if offset < FILE_HEADER_SIZE as i64 || offset >= last_commit {
                continue;
            }
            match self.read_record(offset) {
                Ok(_) => restored += 1,
                Err(e) => warn!("Skipping stale cache offset {offset} ({e})"),
            }
        }
        debug!(
            "Restored {restored} cached records from {}",
            self.cache_path.display()
        );
    }

    /// The data file path this collection was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current commit version: the offset just past the latest sentinel.
    /// Monotonically increasing; usable as a snapshot marker for
    /// [`get_at`](Self::get_at) and [`cursor_at`](Self::cursor_at).
    pub fn version(&self) -> Result<i64> {
        Ok(self.snapshot()?.1)
    }

    /// Point-in-time copy of the operational counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Retrieves the latest visible value for `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let (head, version) = self.snapshot()?;
        self.get_with_snapshot(key, head, version)
    }

    /// Retrieves the value for `key` as of `version` (a value previously
    /// returned by [`update`](Self::update) or [`version`](Self::version)).
    pub fn get_at(&self, key: &[u8], version: i64) -> Result<Option<Vec<u8>>> {
        self.check_healthy()?;
        let head = self.head.load(Ordering::Acquire);
        self.get_with_snapshot(key, head, version)
    }

    fn get_with_snapshot(
        &self,
        key: &[u8],
        head: i64,
        version: i64,
    ) -> Result<Option<Vec<u8>>> {
        let mut cursor = self.seek_cursor(key, head, version)?;
        match cursor.next() {
            Some(Ok(rec)) if rec.key() == key => Ok(Some(rec.value().to_vec())),
            Some(Err(e)) => Err(e),
            _ => Ok(None),
        }
    }

    /// Cursor over every live record at the current version, ascending.
    pub fn cursor(&self) -> Result<Cursor<'_>> {
        let (head, version) = self.snapshot()?;
        Ok(Cursor::new(self, head, version))
    }

    /// Cursor over live records with key ≥ `lo` at the current version.
    /// Inclusive of `lo` itself when such a record exists; the caller bounds
    /// the upper end by stopping its iteration.
    pub fn cursor_from(&self, lo: &[u8]) -> Result<Cursor<'_>> {
        let (head, version) = self.snapshot()?;
        self.seek_cursor(lo, head, version)
    }

    /// Cursor pinned to an explicit snapshot `version`.
    pub fn cursor_at(&self, version: i64) -> Result<Cursor<'_>> {
        self.check_healthy()?;
        let head = self.head.load(Ordering::Acquire);
        Ok(Cursor::new(self, head, version))
    }

    /// Positions a cursor on the first record that could carry a key ≥ `lo`.
    ///
    /// The seek walks to the last record with key strictly below `lo` and
    /// starts iteration at its successor. The strict bound matters: the
    /// newest record with key equal to `lo` may be invisible at the cursor's
    /// snapshot while an older tombstoned twin is still visible, and that
    /// twin sits immediately before it in the chain.
    fn seek_cursor(&self, lo: &[u8], head: i64, version: i64) -> Result<Cursor<'_>> {
        let start = if head == 0 {
            0
        } else {
            match self.find_predecessor(lo, 0, false)? {
                0 => head,
                pred => self.read_record(pred)?.next(),
            }
        };
        Ok(Cursor::new(self, start, version))
    }

    /// Offset of the highest-keyed record whose key is ≤ `key`, or 0 if no
    /// such record exists.
    ///
    /// `start` of 0 begins a fresh search (head check, then the cache hint);
    /// callers resolving many sorted keys in one pass should thread each
    /// nonzero result into the next call's `start`, turning N searches into
    /// one merge-style walk.
    pub fn find_last_less_than_or_equal(&self, key: &[u8], start: i64) -> Result<i64> {
        self.check_healthy()?;
        self.find_predecessor(key, start, true)
    }

    fn find_predecessor(&self, key: &[u8], start: i64, inclusive: bool) -> Result<i64> {
        let head = self.head.load(Ordering::Acquire);
        if head == 0 {
            return Ok(0);
        }

        let mut cursor = start;
        if cursor == 0 {
            let head_rec = self.read_record(head)?;
            let beyond = if inclusive {
                head_rec.key() > key
            } else {
                head_rec.key() >= key
            };
            if beyond {
                return Ok(0);
            }
            cursor = head;

            // The hint is advisory; the on-disk walk below confirms it.
            let hint = self.cache_ref()?.find_last_less_than(key);
            if hint != 0 {
                cursor = hint;
            }
        }

        let mut current = self.read_record(cursor)?;
        loop {
            let next = current.next();
            if next == 0 {
                break;
            }
            let next_rec = self.read_record(next)?;
            let beyond = if inclusive {
                next_rec.key() > key
            } else {
                next_rec.key() >= key
            };
            if beyond {
                break;
            }
            current = next_rec;
        }
        Ok(current.offset())
    }

    /// Loads the record at `offset`, serving from the cache when possible
    /// and offering disk reads back to it.
    pub(crate) fn read_record(&self, offset: i64) -> Result<Arc<Record>> {
        if offset < FILE_HEADER_SIZE as i64 {
            return Err(Error::Corrupt(format!(
                "record offset {offset} points into the file header"
            )));
        }

        if let Some(rec) = self.cache_ref()?.get(offset) {
            return Ok(rec);
        }

        let mmap = self.mmap_arc()?;
        let rec = Arc::new(Record::read_from(&mmap, offset)?);
        self.stats.incr_records_read();
        self.cache_mut()?.push(&rec);
        Ok(rec)
    }

    /// Applies a batch of sets and deletes as one crash-atomic commit and
    /// returns the new version.
    ///
    /// The commit appends all new records plus a sentinel, fsyncs, journals
    /// every header patch (relinked predecessors, tombstones, the file
    /// header) to the write-ahead log, fsyncs, then applies the patches in
    /// place and fsyncs again. The WAL append is the commit point: a crash
    /// before it rolls the batch back on reopen, a crash after it replays
    /// the patches.
    ///
    /// An empty batch returns the current version without touching disk.
    /// I/O failure before the physical append leaves the collection healthy;
    /// failure from the append onward poisons it (every later call fails
    /// with [`Error::Internal`]) until it is reopened.
    pub fn update(&self, batch: &WriteBatch) -> Result<i64> {
        self.check_healthy()?;
        Self::validate_batch(batch)?;

        let _meta = self.meta_lock.write().map_err(|_| Error::Internal)?;
        self.check_healthy()?;

        if batch.is_empty() {
            return Ok(self.last_commit.load(Ordering::Acquire));
        }

        self.commit_batch(batch, StopPoint::Full)
    }

    /// Runs an update up to the moment the appended records and sentinel
    /// are durable but nothing has been journaled, then behaves as if the
    /// process died: the collection is poisoned and must be reopened.
    #[cfg(any(test, debug_assertions))]
    pub fn update_stop_after_append(&self, batch: &WriteBatch) -> Result<i64> {
        self.check_healthy()?;
        Self::validate_batch(batch)?;
        let _meta = self.meta_lock.write().map_err(|_| Error::Internal)?;
        self.commit_batch(batch, StopPoint::AfterAppend)
    }

    /// Runs an update up to the moment the WAL entry is durable but no
    /// patch has been applied, then behaves as if the process died: the
    /// collection is poisoned and must be reopened.
    #[cfg(any(test, debug_assertions))]
    pub fn update_stop_after_wal(&self, batch: &WriteBatch) -> Result<i64> {
        self.check_healthy()?;
        Self::validate_batch(batch)?;
        let _meta = self.meta_lock.write().map_err(|_| Error::Internal)?;
        self.commit_batch(batch, StopPoint::AfterWal)
    }

    fn validate_batch(batch: &WriteBatch) -> Result<()> {
        for (key, value) in &batch.sets {
            if key.is_empty() {
                return Err(Error::EmptyKey);
            }
            if key.len() > u16::MAX as usize {
                return Err(Error::KeyTooLarge);
            }
            if value.len() > u32::MAX as usize {
                return Err(Error::ValueTooLarge);
            }
        }
        for key in &batch.deletes {
            if key.is_empty() {
                return Err(Error::EmptyKey);
            }
            if key.len() > u16::MAX as usize {
                return Err(Error::KeyTooLarge);
            }
        }
        Ok(())
    }

    fn commit_batch(&self, batch: &WriteBatch, stop: StopPoint) -> Result<i64> {
        // P1: resolve every key's on-disk predecessor in one merge-style
        // walk, then pin the distinct predecessors in the cache.
        let keys = batch.sorted_keys();
        let mut last_leq: BTreeMap<&[u8], i64> = BTreeMap::new();
        let mut walk_start = 0i64;
        for &key in &keys {
            let offset = self.find_predecessor(key, walk_start, true)?;
            last_leq.insert(key, offset);
            if offset != 0 {
                walk_start = offset;
            }
        }

        self.cache_mut()?.set_prevent_purge(true);
        let _purge_guard = PurgeGuard { collection: self };

        let mut preds: BTreeMap<i64, Arc<Record>> = BTreeMap::new();
        for &offset in last_leq.values() {
            if offset == 0 || preds.contains_key(&offset) {
                continue;
            }
            let rec = self.read_record(offset)?;
            self.cache_mut()?.force_push(Arc::clone(&rec));
            preds.insert(offset, rec);
        }

        // P2: stage the append buffer. New records splice after either an
        // on-disk predecessor or one appended earlier in this batch,
        // whichever carries the larger key not exceeding theirs.
        let tail = self.last_commit.load(Ordering::Acquire);
        let mut new_records: Vec<NewRecord> = Vec::with_capacity(batch.sets.len());
        let mut new_by_key: BTreeMap<Vec<u8>, usize> = BTreeMap::new();
        let mut dirty: BTreeMap<i64, DirtyRecord> = BTreeMap::new();
        let mut overwritten: Vec<i64> = Vec::new();
        let mut new_head = self.head.load(Ordering::Acquire);
        let mut buf_len = 0i64;

        for (key, value) in &batch.sets {
            let new_offset = tail + buf_len;
            let pred_offset = last_leq[key.as_slice()];

            let next;
            if pred_offset == 0 {
                let in_batch = new_by_key
                    .range::<[u8], _>((Bound::Unbounded, Bound::Included(key.as_slice())))
                    .next_back()
                    .map(|(_, &idx)| idx);
                match in_batch {
                    Some(idx) => {
                        next = new_records[idx].next;
                        new_records[idx].next = new_offset;
                    }
                    None => {
                        next = new_head;
                        new_head = new_offset;
                    }
                }
            } else {
                let pred = &preds[&pred_offset];
                let in_batch = new_by_key
                    .range::<[u8], _>((
                        Bound::Included(pred.key()),
                        Bound::Included(key.as_slice()),
                    ))
                    .next_back()
                    .map(|(_, &idx)| idx);
                match in_batch {
                    Some(idx) => {
                        next = new_records[idx].next;
                        new_records[idx].next = new_offset;
                    }
                    None => {
                        let entry = dirty
                            .entry(pred_offset)
                            .or_insert_with(|| DirtyRecord::from_record(pred));
                        next = entry.next;
                        entry.next = new_offset;
                        if pred.key() == key.as_slice() {
                            overwritten.push(pred_offset);
                        }
                    }
                }
            }

            buf_len += (RECORD_HEADER_SIZE + key.len() + value.len()) as i64;
            new_by_key.insert(key.clone(), new_records.len());
            new_records.push(NewRecord {
                offset: new_offset,
                key: key.clone(),
                value: value.clone(),
                next,
            });
        }

        // P3: append the buffer and the sentinel, fsync, and remap so any
        // link a reader can observe from here on lies inside the map.
        let mut buffer = Vec::with_capacity(buf_len as usize + SENTINEL_SIZE);
        for rec in &new_records {
            let header = RecordHeader {
                next: rec.next,
                deleted: 0,
                key_len: rec.key.len() as u16,
                val_len: rec.value.len() as u32,
            };
            Record::serialize_into(&header, &rec.key, &rec.value, &mut buffer);
        }
        let sentinel_offset = tail + buf_len;
        buffer.extend_from_slice(&Sentinel::new(sentinel_offset).serialize());
        let commit_offset = sentinel_offset + SENTINEL_SIZE as i64;

        {
            let mut file = self.data_file()?;
            let appended: Result<()> = (|| {
                file.seek(SeekFrom::Start(tail as u64))?;
                file.write_all(&buffer)?;
                file.sync_all()?;
                Ok(())
            })();
            if let Err(e) = appended {
                return Err(self.poison(e));
            }
            if let Err(e) = self.remap(&file) {
                return Err(self.poison(e));
            }
        }

        if stop == StopPoint::AfterAppend {
            self.internal_state.store(1, Ordering::Release);
            return Ok(commit_offset);
        }

        // P4: stage tombstones. Deletes of absent keys are no-ops; a record
        // that already carries a tombstone keeps its original version, or a
        // snapshot taken between the two commits would see it resurrected.
        for key in &batch.deletes {
            let pred_offset = last_leq[key.as_slice()];
            if pred_offset == 0 {
                continue;
            }
            let pred = &preds[&pred_offset];
            if pred.key() == key.as_slice() && pred.deleted() == 0 {
                let entry = dirty
                    .entry(pred_offset)
                    .or_insert_with(|| DirtyRecord::from_record(pred));
                if entry.deleted == 0 {
                    entry.deleted = commit_offset;
                }
            }
        }
        for &offset in &overwritten {
            let entry = dirty
                .entry(offset)
                .or_insert_with(|| DirtyRecord::from_record(&preds[&offset]));
            if entry.deleted == 0 {
                entry.deleted = commit_offset;
            }
        }

        // P5: journal every changed header plus the new file header. The
        // header record goes last so replay re-reads it after all patches.
        let mut entry = WalEntry::default();
        for (&offset, staged) in &dirty {
            entry.push(offset, staged.header().serialize().to_vec());
        }
        let new_file_header = FileHeader {
            head: new_head,
            last_commit: commit_offset,
        };
        entry.push(0, new_file_header.serialize().to_vec());

        {
            let mut wal = self.wal_file()?;
            if let Err(e) = wal.append(&entry) {
                return Err(self.poison(e));
            }
        }
        self.stats.incr_wal_entries();

        if stop == StopPoint::AfterWal {
            self.internal_state.store(1, Ordering::Release);
            return Ok(commit_offset);
        }

        // P6: apply the journaled patches in place, fsync, then publish the
        // new link values to the pinned cached records.
        {
            let mut file = self.data_file()?;
            let patched: Result<()> = (|| {
                for rec in &entry.records {
                    file.seek(SeekFrom::Start(rec.offset as u64))?;
                    file.write_all(&rec.data)?;
                }
                file.sync_all()?;
                Ok(())
            })();
            if let Err(e) = patched {
                return Err(self.poison(e));
            }
        }

        for (&offset, staged) in &dirty {
            let rec = &preds[&offset];
            rec.set_next(staged.next);
            rec.set_deleted(staged.deleted);
        }

        let written = new_records.len() as u64;
        {
            let mut cache = self.cache_mut()?;
            for rec in new_records {
                cache.force_push(Arc::new(Record::new(
                    rec.offset, rec.key, rec.value, rec.next, 0,
                )));
            }
        }

        self.head.store(new_head, Ordering::Release);
        self.last_commit.store(commit_offset, Ordering::Release);

        self.stats.incr_updates();
        self.stats.incr_records_written(written);

        // P7: the purge guard unpins the cache on drop.
        Ok(commit_offset)
    }

    /// Swaps in a fresh memory map covering the file's current length.
    fn remap(&self, file: &File) -> Result<()> {
        let mmap = Self::init_mmap(file)?;
        let mut guard = self.mmap.lock().map_err(|_| Error::Internal)?;
        *guard = Arc::new(mmap);
        Ok(())
    }

    fn mmap_arc(&self) -> Result<Arc<Mmap>> {
        let guard = self.mmap.lock().map_err(|_| Error::Internal)?;
        Ok(Arc::clone(&guard))
    }

    /// Consistent (head, version) pair; blocks only while a writer holds the
    /// commit lock.
    fn snapshot(&self) -> Result<(i64, i64)> {
        self.check_healthy()?;
        let _guard = self.meta_lock.read().map_err(|_| Error::Internal)?;
        Ok((
            self.head.load(Ordering::Acquire),
            self.last_commit.load(Ordering::Acquire),
        ))
    }

    fn check_healthy(&self) -> Result<()> {
        if self.internal_state.load(Ordering::Acquire) != 0 {
            return Err(Error::Internal);
        }
        Ok(())
    }

    /// Marks the collection inconsistent and reports [`Error::Internal`].
    /// From the physical append onward, the on-disk state may sit between
    /// "sentinel written" and "patches applied"; reopening replays the WAL
    /// and restores a committed state, so only the in-memory view is lost.
    fn poison(&self, err: Error) -> Error {
        warn!(
            "Collection {} entered an inconsistent state: {err}",
            self.path.display()
        );
        self.internal_state.store(1, Ordering::Release);
        Error::Internal
    }

    fn cache_ref(&self) -> Result<RwLockReadGuard<'_, RecordCache>> {
        self.cache.read().map_err(|_| Error::Internal)
    }

    fn cache_mut(&self) -> Result<RwLockWriteGuard<'_, RecordCache>> {
        self.cache.write().map_err(|_| Error::Internal)
    }

    fn data_file(&self) -> Result<MutexGuard<'_, File>> {
        self.file.lock().map_err(|_| Error::Internal)
    }

    fn wal_file(&self) -> Result<MutexGuard<'_, Wal>> {
        self.wal.lock().map_err(|_| Error::Internal)
    }

    /// Releases the collection. No extra fsync is needed: durability
    /// already holds after every commit.
    pub fn close(self) {
        drop(self);
    }

    /// Closes the collection and unlinks the data file and both side-cars.
    pub fn destroy(self) -> Result<()> {
        let data = self.path.clone();
        let sidecars = [self.wal_path.clone(), self.cache_path.clone()];
        drop(self);

        fs::remove_file(&data)?;
        for path in sidecars {
            if let Err(e) = fs::remove_file(&path)
                && e.kind() != ErrorKind::NotFound
            {
                return Err(e.into());
            }
        }
        Ok(())
    }
}
