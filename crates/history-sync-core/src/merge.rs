use chrono::NaiveDate;
use history_sync_models::{BucketTimeZone, HistoryEntry};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::classify::Classifier;
use crate::error::StoreError;
use crate::report::DateRange;
use crate::store::RecordStore;

/// Result of merging one page into the store.
///
/// The counts are for reporting only; whether a page was "all known" is decided
/// from `new_items` by key, never from positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub added_by_date: BTreeMap<NaiveDate, usize>,
    pub new_items: usize,
    pub known_items: usize,
    /// Items whose timestamp maps to no calendar date.
    pub skipped: usize,
    /// First and last bucket date the page touched.
    pub date_range: Option<DateRange>,
}

impl MergeOutcome {
    pub fn total_added(&self) -> usize {
        self.added_by_date.values().sum()
    }

    pub fn is_all_known(&self) -> bool {
        self.new_items == 0
    }

}

pub struct MergeEngine {
    classifier: Classifier,
    timezone: BucketTimeZone,
}

impl MergeEngine {
    pub fn new(classifier: Classifier, timezone: BucketTimeZone) -> Self {
        Self {
            classifier,
            timezone,
        }
    }

    pub fn timezone(&self) -> BucketTimeZone {
        self.timezone
    }

    /// Group items by the calendar date of their view time, keeping encounter order.
    pub fn group_by_date(&self, items: Vec<HistoryEntry>) -> (BTreeMap<NaiveDate, Vec<HistoryEntry>>, usize) {
        let mut grouped: BTreeMap<NaiveDate, Vec<HistoryEntry>> = BTreeMap::new();
        let mut skipped = 0;
        for item in items {
            match item.bucket_date(&self.timezone) {
                Some(date) => grouped.entry(date).or_default().push(item),
                None => {
                    warn!("Skipping entry {} with unrepresentable view time", item.key());
                    skipped += 1;
                }
            }
        }
        (grouped, skipped)
    }

    pub fn merge_page(&self, store: &mut RecordStore, items: Vec<HistoryEntry>) -> Result<MergeOutcome, StoreError> {
        let (grouped, skipped) = self.group_by_date(items);
        let mut outcome = self.merge(store, grouped)?;
        outcome.skipped = skipped;
        Ok(outcome)
    }

    /// Merge date-grouped items into their buckets.
    ///
    /// Every incoming item is classified and upserted, so a re-fetched entry
    /// overwrites the stored one; only keys absent before count as added.
    pub fn merge(
        &self,
        store: &mut RecordStore,
        grouped: BTreeMap<NaiveDate, Vec<HistoryEntry>>,
    ) -> Result<MergeOutcome, StoreError> {
        let mut outcome = MergeOutcome::default();

        for (date, mut items) in grouped {
            let incoming = items.len();
            DateRange::extend(&mut outcome.date_range, date);
            for item in &mut items {
                self.classifier.annotate(item);
            }
            let added = store.upsert(date, items)?;
            outcome.new_items += added;
            outcome.known_items += incoming - added;
            if added > 0 {
                outcome.added_by_date.insert(date, added);
            }
            debug!("Merged {} item(s) into {}: {} new", incoming, date, added);
        }

        Ok(outcome)
    }
}
