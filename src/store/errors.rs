use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the public `Collection` API.
///
/// The distinction that matters to callers is between transient I/O failures
/// (the collection stays healthy and the operation may be retried) and
/// [`Error::Internal`] (the in-memory view no longer matches the files; the
/// collection must be closed and reopened, which replays the write-ahead
/// log).
#[derive(Debug, Error)]
pub enum Error {
    /// The data file was absent when opening an existing collection.
    #[error("collection data file does not exist: {0}")]
    DoesNotExist(PathBuf),

    /// The collection is in an inconsistent in-memory state. Every public
    /// call fails with this until the collection is closed and reopened.
    #[error("collection is in an inconsistent state; close and reopen it")]
    Internal,

    /// An OS-level read/write error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An on-disk structure failed validation (bounds, magic, checksum).
    #[error("corrupt structure: {0}")]
    Corrupt(String),

    /// Keys are limited to `u16::MAX` bytes by the record layout.
    #[error("key exceeds the maximum length of 65535 bytes")]
    KeyTooLarge,

    /// Values are limited to `u32::MAX` bytes by the record layout.
    #[error("value exceeds the maximum length of 4294967295 bytes")]
    ValueTooLarge,

    /// Zero-length keys are rejected before any mutation.
    #[error("key must not be empty")]
    EmptyKey,
}

pub type Result<T> = std::result::Result<T, Error>;
