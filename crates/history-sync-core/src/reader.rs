use chrono::NaiveDate;
use history_sync_config::PathManager;
use history_sync_models::DayBucket;
use std::path::{Path, PathBuf};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::error::StoreError;
use crate::report::SyncReport;
use crate::store::{bucket_path_for, read_bucket_file, scan_bucket_files};

/// Read-only view of the stored history for display and aggregation.
///
/// Reads go straight to disk, so they see every bucket a cycle has flushed.
pub struct HistoryReader {
    root: PathBuf,
    checkpoints: CheckpointStore,
}

impl HistoryReader {
    pub fn new(root: impl Into<PathBuf>, checkpoint_file: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            checkpoints: CheckpointStore::new(checkpoint_file),
        }
    }

    pub fn from_paths(paths: &PathManager) -> Self {
        Self::new(paths.history_dir(), paths.checkpoint_file())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn list_dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
        Ok(scan_bucket_files(&self.root)?
            .buckets
            .into_iter()
            .map(|(date, _)| date)
            .collect())
    }

    pub fn latest_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self.list_dates()?.last().copied())
    }

    pub fn load(&self, date: NaiveDate) -> Result<Option<DayBucket>, StoreError> {
        read_bucket_file(&bucket_path_for(&self.root, date), date)
    }

    /// Buckets between `start` and `end` inclusive, oldest first. Days without a bucket are skipped.
    pub fn load_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<DayBucket>, StoreError> {
        let mut buckets = Vec::new();
        for (date, path) in scan_bucket_files(&self.root)?.buckets {
            if date < start || date > end {
                continue;
            }
            if let Some(bucket) = read_bucket_file(&path, date)? {
                buckets.push(bucket);
            }
        }
        Ok(buckets)
    }

    pub fn load_all(&self) -> Result<Vec<DayBucket>, StoreError> {
        self.load_range(NaiveDate::MIN, NaiveDate::MAX)
    }

    pub fn checkpoint(&self) -> Result<Option<Checkpoint>, StoreError> {
        self.checkpoints.load()
    }

    pub fn last_report(&self) -> Result<Option<SyncReport>, StoreError> {
        Ok(self.checkpoint()?.and_then(|c| c.last_report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RecordStore;
    use crate::testing::{date, entry, BASE_TS};
    use history_sync_models::BucketTimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_load_range_is_inclusive_and_ordered() {
        let dir = TempDir::new().unwrap();
        let mut store = RecordStore::open(dir.path().join("history"), BucketTimeZone::utc(), 8).unwrap();
        for day in 0..4 {
            let ts = BASE_TS - day * 86_400;
            let bucket_date = entry(1, ts).bucket_date(&BucketTimeZone::utc()).unwrap();
            store.upsert(bucket_date, vec![entry(day as u64, ts)]).unwrap();
        }
        store.flush().unwrap();

        let reader = HistoryReader::new(dir.path().join("history"), dir.path().join("checkpoint.json"));
        let buckets = reader.load_range(date(2023, 11, 12), date(2023, 11, 13)).unwrap();
        let dates: Vec<_> = buckets.iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![date(2023, 11, 12), date(2023, 11, 13)]);

        assert_eq!(reader.latest_date().unwrap(), Some(date(2023, 11, 14)));
        assert_eq!(reader.load_all().unwrap().len(), 4);
        assert!(reader.load(date(2020, 1, 1)).unwrap().is_none());
        assert!(reader.last_report().unwrap().is_none());
    }
}
