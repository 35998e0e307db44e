// File header (fixed 16 bytes at offset 0)
pub const FILE_HEADER_SIZE: usize = 16;
pub const HEAD_RANGE: std::ops::Range<usize> = 0..8;
pub const LAST_COMMIT_RANGE: std::ops::Range<usize> = 8..16;

// Record header (fixed 22-byte prefix; key and value bytes follow)
pub const RECORD_HEADER_SIZE: usize = 22;
pub const NEXT_RANGE: std::ops::Range<usize> = 0..8;
pub const DELETED_RANGE: std::ops::Range<usize> = 8..16;
pub const KEY_LEN_RANGE: std::ops::Range<usize> = 16..18;
pub const VAL_LEN_RANGE: std::ops::Range<usize> = 18..22;

// Sentinel record terminating each commit (12 bytes)
pub const SENTINEL_SIZE: usize = 12;
pub const SENTINEL_MAGIC: u32 = 0xDEAD_10CC;
pub const SENTINEL_MAGIC_RANGE: std::ops::Range<usize> = 0..4;
pub const SENTINEL_OFFSET_RANGE: std::ops::Range<usize> = 4..12;

// Write-ahead log entry footer (crc + entry start + magic)
pub const WAL_FOOTER_SIZE: usize = 16;
pub const WAL_MAGIC: u32 = 0x5741_4C43;
pub const WAL_CRC_RANGE: std::ops::Range<usize> = 0..4;
pub const WAL_START_RANGE: std::ops::Range<usize> = 4..12;
pub const WAL_MAGIC_RANGE: std::ops::Range<usize> = 12..16;

// Each persisted cache slot is one little-endian i64 offset
pub const CACHE_SLOT_SIZE: usize = 8;

pub const DEFAULT_CACHE_CAPACITY: usize = 1024;
