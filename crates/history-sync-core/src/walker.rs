use chrono::NaiveDate;
use history_sync_config::SyncSettings;
use history_sync_models::{SyncCursor, SyncMode};
use history_sync_sources::{Clock, FeedPage, HistoryFeed};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::merge::MergeEngine;
use crate::report::{DateRange, StopReason};
use crate::store::RecordStore;

/// Retry and backoff policy for one walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkSettings {
    /// Extra attempts per page after the first one fails.
    pub retry_budget: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl WalkSettings {
    pub fn from_config(settings: &SyncSettings) -> Self {
        Self {
            retry_budget: settings.retry_budget,
            backoff_base: Duration::from_millis(settings.backoff_base_ms),
            backoff_max: Duration::from_millis(settings.backoff_max_ms),
        }
    }

    /// Delay before retry number `retry` (1-based): base * 2^(retry-1), capped.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.backoff_base.saturating_mul(factor).min(self.backoff_max)
    }
}

impl Default for WalkSettings {
    fn default() -> Self {
        Self::from_config(&SyncSettings::default())
    }
}

/// Outcome of one walk over the feed.
#[derive(Debug)]
pub struct WalkOutcome {
    pub mode: SyncMode,
    pub stop: StopReason,
    /// Cursor after the last page that was merged and flushed.
    pub cursor: SyncCursor,
    pub added_by_date: BTreeMap<NaiveDate, usize>,
    pub fetch_calls: u32,
    pub pages_merged: u32,
    pub secured_range: Option<DateRange>,
    pub error: Option<SyncError>,
}

impl WalkOutcome {
    fn new(mode: SyncMode, cursor: SyncCursor) -> Self {
        Self {
            mode,
            stop: StopReason::Exhausted,
            cursor,
            added_by_date: BTreeMap::new(),
            fetch_calls: 0,
            pages_merged: 0,
            secured_range: None,
            error: None,
        }
    }

    pub fn total_added(&self) -> usize {
        self.added_by_date.values().sum()
    }

    fn failed(mut self, error: SyncError) -> Self {
        self.stop = StopReason::Failed;
        self.error = Some(error);
        self
    }
}

/// Drives the feed from a cursor towards older pages, merging each page before
/// the cursor moves past it.
pub struct PaginationWalker<'a> {
    feed: &'a dyn HistoryFeed,
    engine: &'a MergeEngine,
    clock: Arc<dyn Clock>,
    settings: WalkSettings,
    cancel: CancellationToken,
}

impl<'a> PaginationWalker<'a> {
    pub fn new(
        feed: &'a dyn HistoryFeed,
        engine: &'a MergeEngine,
        clock: Arc<dyn Clock>,
        settings: WalkSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            feed,
            engine,
            clock,
            settings,
            cancel,
        }
    }

    pub async fn walk(&self, store: &mut RecordStore, start: SyncCursor, mode: SyncMode) -> WalkOutcome {
        // Cursors this walk has already requested; a repeat means the remote looped
        let mut visited: HashSet<(u64, i64)> = HashSet::new();
        visited.insert((start.max, start.view_at));
        let mut outcome = WalkOutcome::new(mode, start);

        loop {
            let page = match self.fetch_with_retry(&outcome.cursor, &mut outcome.fetch_calls).await {
                Ok(page) => page,
                Err(error) => {
                    warn!(
                        "Walk stopped at cursor max={} view_at={}: {}",
                        outcome.cursor.max, outcome.cursor.view_at, error
                    );
                    return outcome.failed(error);
                }
            };

            if page.is_empty() {
                debug!("Empty page, remote history exhausted");
                outcome.stop = StopReason::Exhausted;
                return outcome;
            }

            let next = page.advance_from(&outcome.cursor);
            let page_len = page.items.len();

            let merged = match self.engine.merge_page(store, page.items) {
                Ok(merged) => merged,
                Err(error) => {
                    store.discard_unflushed();
                    return outcome.failed(SyncError::Storage(error));
                }
            };
            if let Err(error) = store.flush() {
                store.discard_unflushed();
                return outcome.failed(SyncError::Storage(error));
            }

            outcome.pages_merged += 1;
            for (date, added) in &merged.added_by_date {
                *outcome.added_by_date.entry(*date).or_insert(0) += added;
            }
            // Every date touched by this page is now on disk
            if let Some(range) = merged.date_range {
                DateRange::extend(&mut outcome.secured_range, range.from);
                DateRange::extend(&mut outcome.secured_range, range.to);
            }
            info!(
                page = outcome.pages_merged,
                items = page_len,
                new = merged.new_items,
                known = merged.known_items,
                "Merged history page"
            );

            let caught_up = mode == SyncMode::Incremental && merged.is_all_known();
            let advanced = match next {
                Some(next) if visited.insert((next.max, next.view_at)) => {
                    outcome.cursor = next;
                    true
                }
                _ => false,
            };

            if caught_up {
                debug!("Page fully known, incremental walk caught up");
                outcome.stop = StopReason::CaughtUp;
                return outcome;
            }
            if !advanced {
                warn!(
                    "Remote cursor did not advance past max={} view_at={} or revisited an earlier page, stopping",
                    outcome.cursor.max, outcome.cursor.view_at
                );
                outcome.stop = StopReason::Exhausted;
                return outcome;
            }
        }
    }

    async fn fetch_with_retry(&self, cursor: &SyncCursor, fetch_calls: &mut u32) -> Result<FeedPage, SyncError> {
        let attempts_allowed = self.settings.retry_budget + 1;
        let mut attempt = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            attempt += 1;
            *fetch_calls += 1;
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
                result = self.feed.fetch_page(cursor) => result,
            };
            let error = match result {
                // A page that arrives after cancellation is not applied
                Ok(_) if self.cancel.is_cancelled() => return Err(SyncError::Cancelled),
                Ok(page) => return Ok(page),
                Err(error) => error,
            };

            if !error.is_retryable() || attempt >= attempts_allowed {
                return Err(SyncError::from_fetch(error, attempt));
            }

            let delay = self.settings.backoff_for(attempt);
            warn!(
                "Fetch attempt {}/{} failed: {}. Retrying in {:?}",
                attempt, attempts_allowed, error, delay
            );
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
                _ = self.clock.sleep(delay) => {}
            }
        }
    }
}
