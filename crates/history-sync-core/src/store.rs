use chrono::{Datelike, NaiveDate};
use history_sync_models::{BucketTimeZone, DayBucket, EntryKey, HistoryEntry};
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::StoreError;

/// Date-partitioned store of day buckets, one JSON file per day under `YYYY/MM/DD.json`.
///
/// Buckets are read into a bounded cache, merged in memory and written back as a
/// whole by `flush`. Only one cycle writes at a time, so the cache is the single
/// source of truth between a load and the following flush.
pub struct RecordStore {
    root: PathBuf,
    timezone: BucketTimeZone,
    capacity: usize,
    cache: HashMap<NaiveDate, CachedBucket>,
    // Least recently used first
    recency: VecDeque<NaiveDate>,
}

struct CachedBucket {
    bucket: DayBucket,
    index: HashMap<EntryKey, usize>,
    dirty: bool,
}

impl CachedBucket {
    fn new(bucket: DayBucket) -> Self {
        let index = bucket
            .entries
            .iter()
            .enumerate()
            .map(|(pos, entry)| (entry.key(), pos))
            .collect();
        Self {
            bucket,
            index,
            dirty: false,
        }
    }
}

impl RecordStore {
    pub fn open(root: impl Into<PathBuf>, timezone: BucketTimeZone, capacity: usize) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        info!("Opened record store at {:?} (timezone {})", root, timezone);
        Ok(Self {
            root,
            timezone,
            capacity: capacity.max(1),
            cache: HashMap::new(),
            recency: VecDeque::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn timezone(&self) -> BucketTimeZone {
        self.timezone
    }

    pub fn bucket_path(&self, date: NaiveDate) -> PathBuf {
        bucket_path_for(&self.root, date)
    }

    pub fn bucket_exists(&self, date: NaiveDate) -> bool {
        if let Some(cached) = self.cache.get(&date) {
            if !cached.bucket.is_empty() {
                return true;
            }
        }
        self.bucket_path(date).exists()
    }

    /// Current content of a day, including changes not yet flushed.
    pub fn load_bucket(&mut self, date: NaiveDate) -> Result<DayBucket, StoreError> {
        Ok(self.cached(date)?.bucket.clone())
    }

    pub fn contains(&mut self, date: NaiveDate, key: &EntryKey) -> Result<bool, StoreError> {
        Ok(self.cached(date)?.index.contains_key(key))
    }

    /// Insert or overwrite entries by composite key, returning how many were new.
    ///
    /// An entry whose key is already present replaces the stored one in place, so
    /// the bucket never grows from a re-fetch.
    pub fn upsert(&mut self, date: NaiveDate, entries: Vec<HistoryEntry>) -> Result<usize, StoreError> {
        for entry in &entries {
            let expected = entry.bucket_date(&self.timezone);
            if expected != Some(date) {
                return Err(StoreError::WrongBucket {
                    key: entry.key(),
                    date,
                    expected,
                });
            }
        }

        let cached = self.cached(date)?;
        let mut added = 0;
        for entry in entries {
            let key = entry.key();
            match cached.index.get(&key) {
                Some(&pos) => {
                    if cached.bucket.entries[pos] != entry {
                        cached.bucket.entries[pos] = entry;
                        cached.dirty = true;
                    }
                }
                None => {
                    cached.index.insert(key, cached.bucket.entries.len());
                    cached.bucket.entries.push(entry);
                    cached.dirty = true;
                    added += 1;
                }
            }
        }
        Ok(added)
    }

    /// Durably write every modified bucket. Returns the number of files written.
    pub fn flush(&mut self) -> Result<usize, StoreError> {
        let dirty: Vec<NaiveDate> = self
            .cache
            .iter()
            .filter(|(_, cached)| cached.dirty)
            .map(|(date, _)| *date)
            .collect();

        let mut written = 0;
        for date in dirty {
            let path = self.bucket_path(date);
            if let Some(cached) = self.cache.get_mut(&date) {
                write_bucket(&path, &cached.bucket)?;
                cached.dirty = false;
                written += 1;
            }
        }
        if written > 0 {
            debug!("Flushed {} bucket(s) to {:?}", written, self.root);
        }
        self.evict_clean(0);
        Ok(written)
    }

    /// Drop cached changes that were never flushed, so a failed page is not written later.
    /// Buckets an interrupted `flush` already wrote stay on disk; each of them is a
    /// complete file, and merging the page again leaves them unchanged.
    pub fn discard_unflushed(&mut self) -> usize {
        let dirty: Vec<NaiveDate> = self
            .cache
            .iter()
            .filter(|(_, cached)| cached.dirty)
            .map(|(date, _)| *date)
            .collect();
        for date in &dirty {
            self.cache.remove(date);
            self.recency.retain(|d| d != date);
        }
        if !dirty.is_empty() {
            debug!("Discarded {} unflushed bucket(s)", dirty.len());
        }
        dirty.len()
    }

    pub fn list_dates(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let mut dates: BTreeSet<NaiveDate> = scan_bucket_files(&self.root)?
            .buckets
            .into_iter()
            .map(|(date, _)| date)
            .collect();
        dates.extend(
            self.cache
                .iter()
                .filter(|(_, cached)| !cached.bucket.is_empty())
                .map(|(date, _)| *date),
        );
        Ok(dates.into_iter().collect())
    }

    pub fn latest_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self.list_dates()?.last().copied())
    }

    pub fn cached_buckets(&self) -> usize {
        self.cache.len()
    }

    fn cached(&mut self, date: NaiveDate) -> Result<&mut CachedBucket, StoreError> {
        if !self.cache.contains_key(&date) {
            self.evict_clean(1);
        }
        let path = self.bucket_path(date);
        let recency = &mut self.recency;
        match self.cache.entry(date) {
            Entry::Occupied(slot) => {
                if let Some(pos) = recency.iter().position(|d| *d == date) {
                    recency.remove(pos);
                }
                recency.push_back(date);
                Ok(slot.into_mut())
            }
            Entry::Vacant(slot) => {
                let bucket = read_bucket_file(&path, date)?.unwrap_or_else(|| DayBucket::new(date));
                debug!("Loaded bucket {} ({} entries)", date, bucket.len());
                recency.push_back(date);
                Ok(slot.insert(CachedBucket::new(bucket)))
            }
        }
    }

    /// Drop least recently used clean buckets until `room_for` more fit. Dirty
    /// buckets are only ever written by `flush`, so within one page the cache may
    /// run over capacity.
    fn evict_clean(&mut self, room_for: usize) {
        while self.cache.len() + room_for > self.capacity {
            let Some(pos) = self
                .recency
                .iter()
                .position(|d| self.cache.get(d).map_or(true, |cached| !cached.dirty))
            else {
                break;
            };
            if let Some(oldest) = self.recency.remove(pos) {
                self.cache.remove(&oldest);
                debug!("Evicted bucket {} from cache", oldest);
            }
        }
    }
}

pub fn bucket_path_for(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(format!("{:04}", date.year()))
        .join(format!("{:02}", date.month()))
        .join(format!("{:02}.json", date.day()))
}

/// Read one bucket file. A missing file is `None`; an unparseable one is an error
/// and is left on disk untouched.
pub fn read_bucket_file(path: &Path, date: NaiveDate) -> Result<Option<DayBucket>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    let bucket: DayBucket = serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if bucket.date != date {
        return Err(StoreError::Corrupt {
            path: path.to_path_buf(),
            message: format!("file holds bucket {} instead of {}", bucket.date, date),
        });
    }
    Ok(Some(bucket))
}

fn write_bucket(path: &Path, bucket: &DayBucket) -> Result<(), StoreError> {
    let content = serde_json::to_vec_pretty(bucket).map_err(|source| StoreError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, &content)
}

/// Atomic write: write to temp file, then rename over the target.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let temp_path = temp_path_for(path);
    let written: std::io::Result<()> = (|| {
        let mut file = File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()
    })();
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(StoreError::io(&temp_path, e));
    }
    fs::rename(&temp_path, path).map_err(|e| StoreError::io(path, e))
}

pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

pub(crate) struct BucketScan {
    pub buckets: Vec<(NaiveDate, PathBuf)>,
    /// Files inside the store that are not valid bucket paths (left-over temp files and the like).
    pub strays: Vec<PathBuf>,
}

pub(crate) fn scan_bucket_files(root: &Path) -> Result<BucketScan, StoreError> {
    let mut scan = BucketScan {
        buckets: Vec::new(),
        strays: Vec::new(),
    };
    if !root.exists() {
        return Ok(scan);
    }

    for year_dir in read_dir_sorted(root)? {
        let Some(year) = dir_number::<i32>(&year_dir, 4) else {
            collect_strays(&year_dir, &mut scan.strays)?;
            continue;
        };
        for month_dir in read_dir_sorted(&year_dir)? {
            let Some(month) = dir_number::<u32>(&month_dir, 2) else {
                collect_strays(&month_dir, &mut scan.strays)?;
                continue;
            };
            for file in read_dir_sorted(&month_dir)? {
                match day_file_date(&file, year, month) {
                    Some(date) => scan.buckets.push((date, file)),
                    None => collect_strays(&file, &mut scan.strays)?,
                }
            }
        }
    }
    scan.buckets.sort_by_key(|(date, _)| *date);
    Ok(scan)
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))? {
        let entry = entry.map_err(|e| StoreError::io(dir, e))?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

fn dir_number<T: std::str::FromStr>(path: &Path, width: usize) -> Option<T> {
    if !path.is_dir() {
        return None;
    }
    let name = path.file_name()?.to_str()?;
    if name.len() != width || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

fn day_file_date(path: &Path, year: i32, month: u32) -> Option<NaiveDate> {
    if !path.is_file() || path.extension()?.to_str()? != "json" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    if stem.len() != 2 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, stem.parse().ok()?)
}

fn collect_strays(path: &Path, strays: &mut Vec<PathBuf>) -> Result<(), StoreError> {
    if path.is_dir() {
        for child in read_dir_sorted(path)? {
            collect_strays(&child, strays)?;
        }
    } else {
        strays.push(path.to_path_buf());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{date, entry, BASE_TS};
    use tempfile::TempDir;

    fn open(dir: &TempDir, capacity: usize) -> RecordStore {
        RecordStore::open(dir.path(), BucketTimeZone::utc(), capacity).unwrap()
    }

    #[test]
    fn test_upsert_is_idempotent_and_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir, 8);
        let day = date(2023, 11, 14);

        let first = entry(1, BASE_TS);
        assert_eq!(store.upsert(day, vec![first.clone()]).unwrap(), 1);
        assert_eq!(store.upsert(day, vec![first.clone()]).unwrap(), 0);

        let mut revised = first.clone();
        revised.progress = 99;
        assert_eq!(store.upsert(day, vec![revised]).unwrap(), 0);

        let bucket = store.load_bucket(day).unwrap();
        assert_eq!(bucket.len(), 1);
        assert_eq!(bucket.entries[0].progress, 99);
    }

    #[test]
    fn test_same_content_at_different_times_is_kept() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir, 8);
        let day = date(2023, 11, 14);

        let added = store
            .upsert(day, vec![entry(7, BASE_TS), entry(7, BASE_TS - 60)])
            .unwrap();
        assert_eq!(added, 2);
    }

    #[test]
    fn test_flush_writes_dated_layout() {
        let dir = TempDir::new().unwrap();
        let day = date(2023, 11, 14);
        {
            let mut store = open(&dir, 8);
            store.upsert(day, vec![entry(1, BASE_TS)]).unwrap();
            assert!(!dir.path().join("2023/11/14.json").exists());
            assert_eq!(store.flush().unwrap(), 1);
            assert_eq!(store.flush().unwrap(), 0);
        }
        assert!(dir.path().join("2023/11/14.json").is_file());

        let mut reopened = open(&dir, 8);
        assert!(reopened.bucket_exists(day));
        assert!(!reopened.bucket_exists(date(2023, 11, 13)));
        assert_eq!(reopened.load_bucket(day).unwrap().len(), 1);
        assert_eq!(reopened.latest_date().unwrap(), Some(day));
    }

    #[test]
    fn test_entry_in_wrong_bucket_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir, 8);
        let result = store.upsert(date(2020, 1, 1), vec![entry(1, BASE_TS)]);
        assert!(matches!(result, Err(StoreError::WrongBucket { .. })));
    }

    #[test]
    fn test_failed_flush_keeps_previous_bucket() {
        let dir = TempDir::new().unwrap();
        let day = date(2023, 11, 14);
        let mut store = open(&dir, 8);
        store.upsert(day, vec![entry(1, BASE_TS)]).unwrap();
        store.flush().unwrap();

        // Block the temp file so the next write fails before the rename
        let path = store.bucket_path(day);
        fs::create_dir_all(temp_path_for(&path)).unwrap();

        store.upsert(day, vec![entry(2, BASE_TS - 10)]).unwrap();
        assert!(store.flush().is_err());

        let on_disk = read_bucket_file(&path, day).unwrap().unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk.entries[0].content_id, 1);
    }

    #[test]
    fn test_partial_temp_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let day = date(2023, 11, 14);
        let mut store = open(&dir, 8);
        store.upsert(day, vec![entry(1, BASE_TS)]).unwrap();
        store.flush().unwrap();

        let path = store.bucket_path(day);
        fs::write(temp_path_for(&path), b"{\"date\":\"2023-11-14\",\"entr").unwrap();

        let mut reopened = open(&dir, 8);
        assert_eq!(reopened.load_bucket(day).unwrap().len(), 1);
        assert_eq!(reopened.list_dates().unwrap(), vec![day]);
    }

    #[test]
    fn test_corrupt_bucket_is_an_error_and_untouched() {
        let dir = TempDir::new().unwrap();
        let day = date(2023, 11, 14);
        let mut store = open(&dir, 8);
        let path = store.bucket_path(day);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not json").unwrap();

        let result = store.upsert(day, vec![entry(1, BASE_TS)]);
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
        assert_eq!(fs::read(&path).unwrap(), b"not json");
    }

    fn upsert_three_days(store: &mut RecordStore) {
        for i in 0..3 {
            let ts = BASE_TS - i * 86_400;
            let day = entry(1, ts).bucket_date(&BucketTimeZone::utc()).unwrap();
            store.upsert(day, vec![entry(i as u64 + 1, ts)]).unwrap();
        }
    }

    #[test]
    fn test_dirty_buckets_are_only_written_by_flush() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir, 2);

        upsert_three_days(&mut store);
        assert_eq!(store.cached_buckets(), 3);
        assert!(!dir.path().join("2023/11/14.json").exists());

        assert_eq!(store.flush().unwrap(), 3);
        assert!(store.cached_buckets() <= 2);
        assert_eq!(
            store.list_dates().unwrap(),
            vec![date(2023, 11, 12), date(2023, 11, 13), date(2023, 11, 14)]
        );
    }

    #[test]
    fn test_clean_buckets_are_evicted_first() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir, 2);
        upsert_three_days(&mut store);
        store.flush().unwrap();

        let older = date(2023, 11, 1);
        let ts = BASE_TS - 13 * 86_400;
        store.upsert(older, vec![entry(9, ts)]).unwrap();
        assert!(store.cached_buckets() <= 2);
        assert_eq!(store.flush().unwrap(), 1);
        assert_eq!(store.load_bucket(date(2023, 11, 14)).unwrap().len(), 1);
    }

    #[test]
    fn test_discarded_page_spanning_many_days_leaves_disk_untouched() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir, 2);

        upsert_three_days(&mut store);
        assert_eq!(store.discard_unflushed(), 3);
        assert_eq!(store.flush().unwrap(), 0);
        assert!(store.list_dates().unwrap().is_empty());
    }

    #[test]
    fn test_discard_unflushed() {
        let dir = TempDir::new().unwrap();
        let day = date(2023, 11, 14);
        let mut store = open(&dir, 8);
        store.upsert(day, vec![entry(1, BASE_TS)]).unwrap();

        assert_eq!(store.discard_unflushed(), 1);
        assert!(!store.bucket_exists(day));
        assert_eq!(store.flush().unwrap(), 0);
    }
}
