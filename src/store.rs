mod constants;
pub use constants::DEFAULT_CACHE_CAPACITY;

mod errors;
pub use errors::{Error, Result};

mod record;
pub use record::{FileHeader, Record, RecordHeader};

mod record_cache;

mod wal;

mod write_batch;
pub use write_batch::WriteBatch;

mod collection;
pub use collection::Collection;

mod cursor;
pub use cursor::Cursor;

mod stats;
pub use stats::{Stats, StatsSnapshot};
