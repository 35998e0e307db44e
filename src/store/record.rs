use crate::store::constants::*;
use crate::store::errors::{Error, Result};
use std::sync::atomic::{AtomicI64, Ordering};

/// Fixed 16-byte header at offset 0 of the data file.
///
/// ## Layout
///
/// | Offset Range | Field       | Size (Bytes) | Description                            |
/// |--------------|-------------|--------------|----------------------------------------|
/// | `0 .. 8`     | Head        | `8`          | Offset of the smallest-key live record |
/// | `8 .. 16`    | Last Commit | `8`          | Offset just past the latest sentinel   |
///
/// `last_commit` doubles as the collection version: it is monotonically
/// increasing and identifies a snapshot for readers. A fresh collection has
/// `head = 0` and `last_commit = 16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub head: i64,
    pub last_commit: i64,
}

impl FileHeader {
    #[inline]
    pub fn serialize(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];

        buf[HEAD_RANGE].copy_from_slice(&self.head.to_le_bytes());
        buf[LAST_COMMIT_RANGE].copy_from_slice(&self.last_commit.to_le_bytes());

        buf
    }

    /// # Panics:
    /// - If `data` is shorter than [`FILE_HEADER_SIZE`].
    #[inline]
    pub fn deserialize(data: &[u8]) -> Self {
        Self {
            head: i64::from_le_bytes(data[HEAD_RANGE].try_into().unwrap()),
            last_commit: i64::from_le_bytes(data[LAST_COMMIT_RANGE].try_into().unwrap()),
        }
    }
}

/// Fixed 22-byte prefix of every record.
///
/// ## Layout
///
/// | Offset Range | Field   | Size (Bytes) | Description                                  |
/// |--------------|---------|--------------|----------------------------------------------|
/// | `0 .. 8`     | Next    | `8`          | Offset of the successor record, 0 if tail    |
/// | `8 .. 16`    | Deleted | `8`          | Commit version that tombstoned it, 0 if live |
/// | `16 .. 18`   | Key Len | `2`          | Byte length of the key                       |
/// | `18 .. 22`   | Val Len | `4`          | Byte length of the value                     |
///
/// Key and value bytes follow immediately. `next` and `deleted` are the only
/// fields ever rewritten in place; everything else is immutable once the
/// record is appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub next: i64,
    pub deleted: i64,
    pub key_len: u16,
    pub val_len: u32,
}

impl RecordHeader {
    #[inline]
    pub fn serialize(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut buf = [0u8; RECORD_HEADER_SIZE];

        buf[NEXT_RANGE].copy_from_slice(&self.next.to_le_bytes());
        buf[DELETED_RANGE].copy_from_slice(&self.deleted.to_le_bytes());
        buf[KEY_LEN_RANGE].copy_from_slice(&self.key_len.to_le_bytes());
        buf[VAL_LEN_RANGE].copy_from_slice(&self.val_len.to_le_bytes());

        buf
    }

    /// # Panics:
    /// - If `data` is shorter than [`RECORD_HEADER_SIZE`].
    #[inline]
    pub fn deserialize(data: &[u8]) -> Self {
        Self {
            next: i64::from_le_bytes(data[NEXT_RANGE].try_into().unwrap()),
            deleted: i64::from_le_bytes(data[DELETED_RANGE].try_into().unwrap()),
            key_len: u16::from_le_bytes(data[KEY_LEN_RANGE].try_into().unwrap()),
            val_len: u32::from_le_bytes(data[VAL_LEN_RANGE].try_into().unwrap()),
        }
    }
}

/// 12-byte delimiter written at the end of every commit.
///
/// The offset just past a sentinel is that commit's version. The stored
/// `offset` field (the sentinel's own position) is a diagnostic marker and
/// is not read back during normal operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentinel {
    pub magic: u32,
    pub offset: i64,
}

impl Sentinel {
    pub fn new(offset: i64) -> Self {
        Self {
            magic: SENTINEL_MAGIC,
            offset,
        }
    }

    #[inline]
    pub fn serialize(&self) -> [u8; SENTINEL_SIZE] {
        let mut buf = [0u8; SENTINEL_SIZE];

        buf[SENTINEL_MAGIC_RANGE].copy_from_slice(&self.magic.to_le_bytes());
        buf[SENTINEL_OFFSET_RANGE].copy_from_slice(&self.offset.to_le_bytes());

        buf
    }

    /// # Panics:
    /// - If `data` is shorter than [`SENTINEL_SIZE`].
    #[inline]
    pub fn deserialize(data: &[u8]) -> Self {
        Self {
            magic: u32::from_le_bytes(data[SENTINEL_MAGIC_RANGE].try_into().unwrap()),
            offset: i64::from_le_bytes(data[SENTINEL_OFFSET_RANGE].try_into().unwrap()),
        }
    }
}

/// In-memory form of an on-disk record.
///
/// Key, value, and offset are immutable. `next` and `deleted` are atomics so
/// that the writer can publish an in-place link patch while concurrent
/// readers hold the same `Arc<Record>`: a reader observes either the
/// pre-commit or the post-commit value, never a torn one. Snapshot filtering
/// (offset and tombstone version checks against the reader's version) makes
/// either observation consistent.
#[derive(Debug)]
pub struct Record {
    offset: i64,
    key: Vec<u8>,
    value: Vec<u8>,
    next: AtomicI64,
    deleted: AtomicI64,
}

impl Record {
    pub fn new(offset: i64, key: Vec<u8>, value: Vec<u8>, next: i64, deleted: i64) -> Self {
        Self {
            offset,
            key,
            value,
            next: AtomicI64::new(next),
            deleted: AtomicI64::new(deleted),
        }
    }

    /// Decodes the record starting at `offset` within the mapped data file.
    ///
    /// Bounds are validated against the map before any slice is taken, so a
    /// dangling link or a truncated file surfaces as [`Error::Corrupt`]
    /// rather than a panic.
    pub fn read_from(data: &[u8], offset: i64) -> Result<Self> {
        let start = offset as usize;
        if offset < FILE_HEADER_SIZE as i64 || start + RECORD_HEADER_SIZE > data.len() {
            return Err(Error::Corrupt(format!(
                "record header at offset {offset} is out of bounds"
            )));
        }

        let header = RecordHeader::deserialize(&data[start..start + RECORD_HEADER_SIZE]);

        let body = start + RECORD_HEADER_SIZE;
        let key_end = body + header.key_len as usize;
        let val_end = key_end + header.val_len as usize;
        if val_end > data.len() {
            return Err(Error::Corrupt(format!(
                "record body at offset {offset} extends past end of file"
            )));
        }

        Ok(Self::new(
            offset,
            data[body..key_end].to_vec(),
            data[key_end..val_end].to_vec(),
            header.next,
            header.deleted,
        ))
    }

    /// Serializes header, key, and value into `buf` (append-buffer form).
    pub fn serialize_into(header: &RecordHeader, key: &[u8], value: &[u8], buf: &mut Vec<u8>) {
        buf.extend_from_slice(&header.serialize());
        buf.extend_from_slice(key);
        buf.extend_from_slice(value);
    }

    #[inline]
    pub fn offset(&self) -> i64 {
        self.offset
    }

    #[inline]
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    #[inline]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    #[inline]
    pub fn next(&self) -> i64 {
        self.next.load(Ordering::Acquire)
    }

    #[inline]
    pub fn deleted(&self) -> i64 {
        self.deleted.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_next(&self, next: i64) {
        self.next.store(next, Ordering::Release);
    }

    #[inline]
    pub(crate) fn set_deleted(&self, deleted: i64) {
        self.deleted.store(deleted, Ordering::Release);
    }

    /// Current header snapshot (used when staging in-place patches).
    pub fn header(&self) -> RecordHeader {
        RecordHeader {
            next: self.next(),
            deleted: self.deleted(),
            key_len: self.key.len() as u16,
            val_len: self.value.len() as u32,
        }
    }

    /// Total on-disk length of this record in bytes.
    #[inline]
    pub fn disk_len(&self) -> usize {
        RECORD_HEADER_SIZE + self.key.len() + self.value.len()
    }
}
