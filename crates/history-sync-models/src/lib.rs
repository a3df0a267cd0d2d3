pub mod bucket;
pub mod cursor;
pub mod entry;
pub mod mode;
pub mod timezone;

pub use bucket::DayBucket;
pub use cursor::SyncCursor;
pub use entry::{ContentType, EntryKey, HistoryEntry};
pub use mode::SyncMode;
pub use timezone::BucketTimeZone;
