use crate::store::constants::*;
use crate::store::errors::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// One byte-level patch to the data file: `data` is rewritten at `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WalRecord {
    pub offset: i64,
    pub data: Vec<u8>,
}

/// A group of patches that must be applied to the data file atomically.
///
/// One entry is logged per commit: the 22-byte header of every record whose
/// `next` or `deleted` changed, followed by the 16-byte file header carrying
/// the new head and version. Replaying an entry is idempotent: applying a
/// committed entry a second time rewrites identical bytes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct WalEntry {
    pub records: Vec<WalRecord>,
}

impl WalEntry {
    pub fn push(&mut self, offset: i64, data: Vec<u8>) {
        self.records.push(WalRecord { offset, data });
    }

    /// On-disk form: each record as `(offset: i64, size: i64, data)`, then a
    /// 16-byte footer `{ crc, entry start, magic }`. The CRC covers the
    /// record bytes so a torn tail is detected unambiguously.
    fn serialize(&self, start: u64) -> Vec<u8> {
        let mut buf = Vec::new();

        for rec in &self.records {
            buf.extend_from_slice(&rec.offset.to_le_bytes());
            buf.extend_from_slice(&(rec.data.len() as i64).to_le_bytes());
            buf.extend_from_slice(&rec.data);
        }

        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf.extend_from_slice(&(start as i64).to_le_bytes());
        buf.extend_from_slice(&WAL_MAGIC.to_le_bytes());

        buf
    }

    fn parse_records(body: &[u8]) -> Result<Vec<WalRecord>> {
        let mut records = Vec::new();
        let mut pos = 0usize;

        while pos < body.len() {
            if pos + 16 > body.len() {
                return Err(Error::Corrupt(
                    "write-ahead log record header is truncated".to_string(),
                ));
            }
            let offset = i64::from_le_bytes(body[pos..pos + 8].try_into().unwrap());
            let size = i64::from_le_bytes(body[pos + 8..pos + 16].try_into().unwrap());
            pos += 16;

            if size < 0 || pos + size as usize > body.len() {
                return Err(Error::Corrupt(
                    "write-ahead log record size is out of bounds".to_string(),
                ));
            }
            records.push(WalRecord {
                offset,
                data: body[pos..pos + size as usize].to_vec(),
            });
            pos += size as usize;
        }

        Ok(records)
    }
}

/// Append-only log of [`WalEntry`] groups, one per commit.
///
/// The log is the commit point of an update: once an entry is appended and
/// fsynced, the commit survives any crash, because recovery replays the last
/// entry's patches. Entries before the last are dead weight (a commit's
/// patches are durably applied before the next entry is appended), which is
/// why a torn tail discards the whole log rather than scanning backwards.
#[derive(Debug)]
pub(crate) struct Wal {
    file: File,
    path: PathBuf,
}

impl Wal {
    /// Opens the log at `path`, creating it when absent.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Appends `entry` and fsyncs. Returns the entry's starting offset.
    pub fn append(&mut self, entry: &WalEntry) -> Result<u64> {
        let start = self.file.seek(SeekFrom::End(0))?;
        self.file.write_all(&entry.serialize(start))?;
        self.file.sync_all()?;
        Ok(start)
    }

    /// Locates and parses the last well-formed entry.
    ///
    /// Fails with [`Error::Corrupt`] when the tail is torn (short file, bad
    /// magic, out-of-range start, or checksum mismatch).
    pub fn read_last_entry(&mut self) -> Result<WalEntry> {
        let len = self.file.metadata()?.len();
        if len < WAL_FOOTER_SIZE as u64 {
            return Err(Error::Corrupt(
                "write-ahead log holds no complete entry".to_string(),
            ));
        }

        let mut footer = [0u8; WAL_FOOTER_SIZE];
        self.file.seek(SeekFrom::Start(len - WAL_FOOTER_SIZE as u64))?;
        self.file.read_exact(&mut footer)?;

        let crc = u32::from_le_bytes(footer[WAL_CRC_RANGE].try_into().unwrap());
        let start = i64::from_le_bytes(footer[WAL_START_RANGE].try_into().unwrap());
        let magic = u32::from_le_bytes(footer[WAL_MAGIC_RANGE].try_into().unwrap());

        if magic != WAL_MAGIC {
            return Err(Error::Corrupt(
                "write-ahead log footer magic mismatch".to_string(),
            ));
        }
        if start < 0 || start as u64 > len - WAL_FOOTER_SIZE as u64 {
            return Err(Error::Corrupt(
                "write-ahead log entry start is out of bounds".to_string(),
            ));
        }

        let body_len = (len - WAL_FOOTER_SIZE as u64 - start as u64) as usize;
        let mut body = vec![0u8; body_len];
        self.file.seek(SeekFrom::Start(start as u64))?;
        self.file.read_exact(&mut body)?;

        if crc32fast::hash(&body) != crc {
            return Err(Error::Corrupt(
                "write-ahead log entry checksum mismatch".to_string(),
            ));
        }

        Ok(WalEntry {
            records: WalEntry::parse_records(&body)?,
        })
    }

    /// Discards a torn tail by truncating the whole log.
    pub fn truncate(&mut self) -> Result<()> {
        warn!("Truncating write-ahead log {}", self.path.display());
        self.file.set_len(0)?;
        self.file.sync_all()?;
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
