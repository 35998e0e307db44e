use crate::store::collection::Collection;
use crate::store::errors::{Error, Result};
use crate::store::record::Record;
use std::sync::Arc;

/// Iterator over live records in ascending key order at a fixed snapshot.
///
/// The cursor follows `next` links through every record, including ones
/// appended or tombstoned after its snapshot was taken, and filters for
/// visibility: a record is yielded iff it was written before the snapshot
/// (`offset < version`) and is not tombstoned as of it (`deleted == 0` or
/// `deleted > version`). Tombstoned records are never unlinked from the
/// chain, so traversal through them is what keeps old snapshots coherent
/// while newer commits land.
///
/// Yields `Result` items: an I/O or corruption error ends the iteration
/// after surfacing once.
pub struct Cursor<'c> {
    collection: &'c Collection,
    next_offset: i64,
    snapshot: i64,
}

impl<'c> Cursor<'c> {
    pub(crate) fn new(collection: &'c Collection, start: i64, snapshot: i64) -> Self {
        Self {
            collection,
            next_offset: start,
            snapshot,
        }
    }

    /// The commit version this cursor reads at.
    pub fn snapshot_version(&self) -> i64 {
        self.snapshot
    }
}

impl Iterator for Cursor<'_> {
    type Item = Result<Arc<Record>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.next_offset == 0 {
                return None;
            }

            let rec = match self.collection.read_record(self.next_offset) {
                Ok(rec) => rec,
                Err(e) => {
                    self.next_offset = 0;
                    return Some(Err(e));
                }
            };

            // Links only point forward; anything else is a corrupt chain
            // and would loop.
            let next = rec.next();
            if next != 0 && next <= rec.offset() {
                self.next_offset = 0;
                return Some(Err(Error::Corrupt(format!(
                    "record at offset {} links backward to {next}",
                    rec.offset()
                ))));
            }
            self.next_offset = next;

            if rec.offset() < self.snapshot {
                let deleted = rec.deleted();
                if deleted == 0 || deleted > self.snapshot {
                    return Some(Ok(rec));
                }
            }
        }
    }
}
