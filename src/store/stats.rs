use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters shared between the collection and its record cache.
///
/// All counters are monotonically increasing and relaxed; they exist for
/// observability, not for synchronization.
#[derive(Debug, Default)]
pub struct Stats {
    updates: AtomicU64,
    records_written: AtomicU64,
    records_read: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    wal_entries: AtomicU64,
}

impl Stats {
    #[inline]
    pub(crate) fn incr_updates(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn incr_records_written(&self, n: u64) {
        self.records_written.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn incr_records_read(&self) {
        self.records_read.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn incr_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn incr_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn incr_wal_entries(&self) {
        self.wal_entries.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            updates: self.updates.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            records_read: self.records_read.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            wal_entries: self.wal_entries.load(Ordering::Relaxed),
        }
    }
}

/// Plain-data view of [`Stats`] at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub updates: u64,
    pub records_written: u64,
    pub records_read: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub wal_entries: u64,
}
