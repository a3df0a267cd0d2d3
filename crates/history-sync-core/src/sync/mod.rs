use chrono::Utc;
use history_sync_config::{Config, PathManager};
use history_sync_models::{SyncCursor, SyncMode};
use history_sync_sources::{Clock, HistoryFeed, SystemClock};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::checkpoint::{Checkpoint, CheckpointStore, PendingWalk};
use crate::classify::Classifier;
use crate::error::{StoreError, SyncError};
use crate::merge::MergeEngine;
use crate::report::{DateRange, SyncReport};
use crate::run_lock::RunLock;
use crate::store::RecordStore;
use crate::walker::{PaginationWalker, WalkSettings};

#[cfg(test)]
mod tests;

/// Runs sync cycles: one at a time, each ending with a single checkpoint write.
pub struct SyncOrchestrator {
    feed: Arc<dyn HistoryFeed>,
    // Holding this mutex is the in-process run lock
    store: Arc<Mutex<RecordStore>>,
    engine: MergeEngine,
    checkpoints: CheckpointStore,
    settings: WalkSettings,
    clock: Arc<dyn Clock>,
    lock_file: Option<(PathBuf, chrono::Duration)>,
}

struct PlannedWalk {
    walk: PendingWalk,
    resumed: bool,
}

impl SyncOrchestrator {
    pub fn new(
        feed: Arc<dyn HistoryFeed>,
        store: RecordStore,
        engine: MergeEngine,
        checkpoints: CheckpointStore,
        settings: WalkSettings,
    ) -> Self {
        Self {
            feed,
            store: Arc::new(Mutex::new(store)),
            engine,
            checkpoints,
            settings,
            clock: Arc::new(SystemClock),
            lock_file: None,
        }
    }

    /// Wire up store, classifier, checkpoint and lock file from configuration.
    pub fn from_config(feed: Arc<dyn HistoryFeed>, config: &Config, paths: &PathManager) -> Result<Self, StoreError> {
        let timezone = config.sync.timezone;
        let store = RecordStore::open(paths.history_dir(), timezone, config.sync.bucket_cache_size)?;
        let engine = MergeEngine::new(Classifier::new(config.categories.clone()), timezone);
        let stale_after = chrono::Duration::minutes(config.sync.stale_lock_minutes as i64);

        Ok(Self::new(
            feed,
            store,
            engine,
            CheckpointStore::new(paths.checkpoint_file()),
            WalkSettings::from_config(&config.sync),
        )
        .with_lock_file(paths.lock_file(), stale_after))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_lock_file(mut self, path: PathBuf, stale_after: chrono::Duration) -> Self {
        self.lock_file = Some((path, stale_after));
        self
    }

    pub fn store(&self) -> Arc<Mutex<RecordStore>> {
        Arc::clone(&self.store)
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    pub async fn run_cycle(&self, mode: SyncMode) -> SyncReport {
        self.run_cycle_with_cancel(mode, CancellationToken::new()).await
    }

    /// Run one cycle. `cancel` is checked before every page request.
    #[instrument(skip(self, cancel), fields(source = self.feed.source_name()))]
    pub async fn run_cycle_with_cancel(&self, mode: SyncMode, cancel: CancellationToken) -> SyncReport {
        let Ok(mut store) = self.store.try_lock() else {
            warn!("Sync cycle already running in this process, rejecting trigger");
            return SyncReport::already_running(mode);
        };

        let _file_lock = match &self.lock_file {
            Some((path, stale_after)) => match RunLock::acquire(path, *stale_after) {
                Ok(Some(lock)) => Some(lock),
                Ok(None) => {
                    warn!("Sync cycle already running in another process ({:?})", path);
                    return SyncReport::already_running(mode);
                }
                Err(e) => {
                    let mut report = SyncReport::started(mode, Utc::now());
                    report.fail(&SyncError::Storage(e));
                    report.finished_at = Utc::now();
                    return report;
                }
            },
            None => None,
        };

        let mut report = SyncReport::started(mode, Utc::now());

        let previous = match self.checkpoints.load() {
            Ok(previous) => previous,
            Err(e) => {
                warn!("Ignoring unreadable checkpoint, starting over: {}", e);
                None
            }
        };

        let effective = match (mode, &previous) {
            (SyncMode::Incremental, None) => {
                match store.latest_date() {
                    Ok(Some(latest)) => info!(
                        "No checkpoint found; latest stored bucket is {}, running full backfill",
                        latest
                    ),
                    Ok(None) => info!("No checkpoint found and store is empty, running full backfill"),
                    Err(e) => warn!("No checkpoint found and store scan failed ({}), running full backfill", e),
                }
                SyncMode::Full
            }
            _ => mode,
        };
        report.mode = effective;

        let (mut final_cursor, previous_pending) = match previous {
            Some(checkpoint) => (checkpoint.cursor, checkpoint.pending),
            None => (SyncCursor::empty(), Vec::new()),
        };

        let mut queue: VecDeque<PlannedWalk> = VecDeque::new();
        queue.push_back(PlannedWalk {
            walk: PendingWalk {
                cursor: SyncCursor::empty(),
                mode: effective,
            },
            resumed: false,
        });
        // A full walk covers what pending walks would; they are only resumed incrementally
        let mut carried = Vec::new();
        if effective == SyncMode::Incremental {
            report.resumed_walks = previous_pending.len();
            queue.extend(previous_pending.into_iter().map(|walk| PlannedWalk { walk, resumed: true }));
        } else {
            carried = previous_pending;
        }

        info!(
            operation = "sync_cycle",
            mode = %effective,
            walks = queue.len(),
            "Starting sync cycle"
        );

        let walker = PaginationWalker::new(
            self.feed.as_ref(),
            &self.engine,
            Arc::clone(&self.clock),
            self.settings,
            cancel,
        );

        let mut pending = Vec::new();
        let mut failure: Option<SyncError> = None;

        while let Some(planned) = queue.pop_front() {
            if failure.is_some() {
                // Not attempted this time; keep it for the next cycle
                pending.push(planned.walk);
                continue;
            }

            let outcome = walker
                .walk(&mut store, planned.walk.cursor.clone(), planned.walk.mode)
                .await;

            report.fetch_calls += outcome.fetch_calls;
            report.pages_merged += outcome.pages_merged;
            for (date, added) in &outcome.added_by_date {
                *report.added_by_date.entry(*date).or_insert(0) += added;
            }
            if let Some(range) = outcome.secured_range {
                DateRange::extend(&mut report.secured_range, range.from);
                DateRange::extend(&mut report.secured_range, range.to);
            }
            report.stop_reason = Some(outcome.stop);
            if outcome.pages_merged > 0 {
                final_cursor = outcome.cursor.clone();
            }

            match outcome.error {
                Some(error) => {
                    if !outcome.cursor.is_empty() {
                        pending.push(PendingWalk {
                            cursor: outcome.cursor,
                            mode: planned.walk.mode,
                        });
                    }
                    failure = Some(error);
                }
                None => {
                    if !planned.resumed && planned.walk.mode == SyncMode::Full {
                        // The whole feed was walked; nothing older is left behind
                        carried.clear();
                    }
                }
            }
        }

        carried.extend(pending);
        let pending = carried;
        report.pending_walks = pending.len();
        if let Some(error) = &failure {
            report.fail(error);
        }
        report.finished_at = Utc::now();

        let checkpoint = Checkpoint {
            cursor: final_cursor,
            pending,
            last_report: Some(report.clone()),
            updated_at: report.finished_at,
        };
        if let Err(e) = self.checkpoints.save(&checkpoint) {
            error!("Failed to save checkpoint: {}", e);
            report.fail(&SyncError::Storage(e));
        }

        match &report.error {
            None => info!(
                operation = "sync_cycle",
                added = report.total_added(),
                fetch_calls = report.fetch_calls,
                pages = report.pages_merged,
                stop = ?report.stop_reason,
                "Sync cycle finished"
            ),
            Some(err) => warn!(
                operation = "sync_cycle",
                added = report.total_added(),
                fetch_calls = report.fetch_calls,
                kind = %err.kind,
                "Sync cycle stopped early: {}",
                err.message
            ),
        }

        report
    }
}
