use chrono::NaiveDate;
use history_sync_models::{BucketTimeZone, EntryKey};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::store::{read_bucket_file, scan_bucket_files};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CorruptBucket {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MisplacedEntry {
    pub bucket: NaiveDate,
    pub key: EntryKey,
    pub expected: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DuplicateKey {
    pub bucket: NaiveDate,
    pub key: EntryKey,
    pub occurrences: usize,
}

/// Findings of a read-only scan over every stored bucket.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub buckets_scanned: usize,
    pub total_entries: usize,
    pub corrupt: Vec<CorruptBucket>,
    pub misplaced: Vec<MisplacedEntry>,
    pub duplicates: Vec<DuplicateKey>,
    /// Files that are not part of the bucket layout, such as temp files left by a crash.
    pub stray_files: Vec<PathBuf>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.corrupt.is_empty() && self.misplaced.is_empty() && self.duplicates.is_empty()
    }
}

pub fn verify_store(root: &Path, timezone: BucketTimeZone) -> Result<IntegrityReport, StoreError> {
    let scan = scan_bucket_files(root)?;
    let mut report = IntegrityReport {
        stray_files: scan.strays,
        ..Default::default()
    };

    for (date, path) in scan.buckets {
        report.buckets_scanned += 1;
        let bucket = match read_bucket_file(&path, date) {
            Ok(Some(bucket)) => bucket,
            Ok(None) => continue,
            Err(StoreError::Corrupt { path, message }) => {
                warn!("Corrupt bucket {:?}: {}", path, message);
                report.corrupt.push(CorruptBucket { path, message });
                continue;
            }
            Err(e) => return Err(e),
        };

        report.total_entries += bucket.len();
        let mut seen: HashMap<EntryKey, usize> = HashMap::new();
        for entry in &bucket.entries {
            *seen.entry(entry.key()).or_insert(0) += 1;
            let expected = entry.bucket_date(&timezone);
            if expected != Some(date) {
                report.misplaced.push(MisplacedEntry {
                    bucket: date,
                    key: entry.key(),
                    expected,
                });
            }
        }
        let mut duplicates: Vec<DuplicateKey> = seen
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(key, occurrences)| DuplicateKey {
                bucket: date,
                key,
                occurrences,
            })
            .collect();
        duplicates.sort_by_key(|d| d.key);
        report.duplicates.extend(duplicates);
    }

    info!(
        "Integrity scan: {} buckets, {} entries, {} corrupt, {} misplaced, {} duplicate keys",
        report.buckets_scanned,
        report.total_entries,
        report.corrupt.len(),
        report.misplaced.len(),
        report.duplicates.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{bucket_path_for, RecordStore};
    use crate::testing::{date, entry, BASE_TS};
    use history_sync_models::DayBucket;
    use tempfile::TempDir;

    fn write_raw(root: &Path, bucket: &DayBucket) {
        let path = bucket_path_for(root, bucket.date);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_vec(bucket).unwrap()).unwrap();
    }

    #[test]
    fn test_clean_store() {
        let dir = TempDir::new().unwrap();
        let mut store = RecordStore::open(dir.path(), BucketTimeZone::utc(), 4).unwrap();
        store
            .upsert(date(2023, 11, 14), vec![entry(1, BASE_TS), entry(2, BASE_TS - 5)])
            .unwrap();
        store.flush().unwrap();

        let report = verify_store(dir.path(), BucketTimeZone::utc()).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.buckets_scanned, 1);
        assert_eq!(report.total_entries, 2);
    }

    #[test]
    fn test_detects_problems() {
        let dir = TempDir::new().unwrap();
        let mut bad = DayBucket::new(date(2023, 11, 14));
        bad.entries = vec![entry(1, BASE_TS), entry(1, BASE_TS), entry(2, BASE_TS - 86_400)];
        write_raw(dir.path(), &bad);

        let corrupt_path = bucket_path_for(dir.path(), date(2023, 11, 10));
        std::fs::create_dir_all(corrupt_path.parent().unwrap()).unwrap();
        std::fs::write(&corrupt_path, "[").unwrap();
        std::fs::write(dir.path().join("2023/11/14.json.tmp"), "{").unwrap();

        let report = verify_store(dir.path(), BucketTimeZone::utc()).unwrap();
        assert!(!report.is_clean());
        assert_eq!(report.buckets_scanned, 2);
        assert_eq!(report.corrupt.len(), 1);
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].occurrences, 2);
        assert_eq!(report.misplaced.len(), 1);
        assert_eq!(report.misplaced[0].expected, Some(date(2023, 11, 13)));
        assert_eq!(report.stray_files.len(), 1);
    }
}
