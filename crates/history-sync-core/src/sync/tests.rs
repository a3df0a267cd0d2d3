use super::*;
use crate::error::ErrorKind;
use crate::reader::HistoryReader;
use crate::report::{StopReason, SyncStatus};
use crate::store::bucket_path_for;
use crate::testing::{date, hourly_entries, PagedFeed, BASE_TS};
use history_sync_models::{BucketTimeZone, EntryKey};
use history_sync_sources::{FetchError, ManualClock};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    dir: TempDir,
    feed: Arc<PagedFeed>,
    clock: Arc<ManualClock>,
    orchestrator: SyncOrchestrator,
}

impl Harness {
    fn new(items: usize) -> Self {
        let dir = TempDir::new().unwrap();
        let feed = Arc::new(PagedFeed::new(hourly_entries(1, BASE_TS, items), 30));
        let clock = Arc::new(ManualClock::new());

        let store = RecordStore::open(dir.path().join("history"), BucketTimeZone::utc(), 16).unwrap();
        let engine = MergeEngine::new(Classifier::default(), BucketTimeZone::utc());
        let settings = WalkSettings {
            retry_budget: 2,
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_secs(1),
        };
        let orchestrator = SyncOrchestrator::new(
            feed.clone(),
            store,
            engine,
            CheckpointStore::new(dir.path().join("checkpoint.json")),
            settings,
        )
        .with_clock(clock.clone())
        .with_lock_file(dir.path().join("sync.lock"), chrono::Duration::minutes(30));

        Self {
            dir,
            feed,
            clock,
            orchestrator,
        }
    }

    fn reader(&self) -> HistoryReader {
        HistoryReader::new(self.dir.path().join("history"), self.dir.path().join("checkpoint.json"))
    }

    fn stored_keys(&self) -> BTreeMap<chrono::NaiveDate, BTreeSet<EntryKey>> {
        self.reader()
            .load_all()
            .unwrap()
            .into_iter()
            .map(|b| (b.date, b.keys().collect()))
            .collect()
    }

    fn stored_count(&self) -> usize {
        self.stored_keys().values().map(|keys| keys.len()).sum()
    }

    fn checkpoint(&self) -> Checkpoint {
        self.orchestrator.checkpoints().load().unwrap().unwrap()
    }
}

#[tokio::test]
async fn test_full_backfill_of_three_pages() {
    let h = Harness::new(70);

    let report = h.orchestrator.run_cycle(SyncMode::Full).await;

    assert_eq!(report.status, SyncStatus::Succeeded);
    assert_eq!(report.stop_reason, Some(StopReason::Exhausted));
    assert_eq!(report.fetch_calls, 4);
    assert_eq!(h.feed.calls(), 4);
    assert_eq!(report.pages_merged, 3);
    assert_eq!(report.total_added(), 70);
    assert_eq!(h.stored_count(), 70);
    assert_eq!(h.orchestrator.checkpoints().writes(), 1);

    let checkpoint = h.checkpoint();
    assert_eq!(checkpoint.cursor, SyncCursor::new(70, BASE_TS - 69 * 3600));
    assert!(checkpoint.pending.is_empty());
    assert_eq!(checkpoint.last_report, Some(report));
}

#[tokio::test]
async fn test_first_incremental_run_becomes_full() {
    let h = Harness::new(70);

    let report = h.orchestrator.run_cycle(SyncMode::Incremental).await;

    assert_eq!(report.requested_mode, SyncMode::Incremental);
    assert_eq!(report.mode, SyncMode::Full);
    assert_eq!(report.fetch_calls, 4);
    assert_eq!(h.stored_count(), 70);
}

#[tokio::test]
async fn test_incremental_on_unchanged_feed_needs_one_request() {
    let h = Harness::new(70);
    h.orchestrator.run_cycle(SyncMode::Full).await;

    let report = h.orchestrator.run_cycle(SyncMode::Incremental).await;

    assert_eq!(report.status, SyncStatus::Succeeded);
    assert_eq!(report.mode, SyncMode::Incremental);
    assert_eq!(report.stop_reason, Some(StopReason::CaughtUp));
    assert_eq!(report.fetch_calls, 1);
    assert_eq!(report.total_added(), 0);
    assert_eq!(h.feed.calls(), 5);
}

#[tokio::test]
async fn test_incremental_stops_at_first_known_page() {
    let h = Harness::new(70);
    h.orchestrator.run_cycle(SyncMode::Full).await;
    let before = h.stored_keys();

    h.feed.prepend(hourly_entries(1000, BASE_TS + 45 * 3600, 45));
    let report = h.orchestrator.run_cycle(SyncMode::Incremental).await;

    assert_eq!(report.stop_reason, Some(StopReason::CaughtUp));
    assert_eq!(report.fetch_calls, 3);
    assert_eq!(report.total_added(), 45);
    assert_eq!(h.stored_count(), 115);

    // Union only: nothing stored before is lost
    let after = h.stored_keys();
    for (date, keys) in before {
        assert!(after[&date].is_superset(&keys));
    }
}

#[tokio::test]
async fn test_exhausted_retries_keep_first_page() {
    let h = Harness::new(70);
    h.feed.fail_page(
        1,
        vec![
            FetchError::Transient("HTTP 502".into()),
            FetchError::Transient("HTTP 502".into()),
            FetchError::Transient("HTTP 502".into()),
        ],
    );

    let report = h.orchestrator.run_cycle(SyncMode::Full).await;

    assert_eq!(report.status, SyncStatus::PartialFailure);
    assert_eq!(report.stop_reason, Some(StopReason::Failed));
    assert_eq!(report.error.as_ref().unwrap().kind, ErrorKind::TransientFetch);
    assert_eq!(report.fetch_calls, 4);
    assert_eq!(report.total_added(), 30);
    assert_eq!(h.stored_count(), 30);
    assert_eq!(
        h.clock.sleeps(),
        vec![Duration::from_millis(10), Duration::from_millis(20)]
    );

    let page_one_cursor = SyncCursor::new(30, BASE_TS - 29 * 3600);
    let checkpoint = h.checkpoint();
    assert_eq!(checkpoint.cursor, page_one_cursor);
    assert_eq!(
        checkpoint.pending,
        vec![PendingWalk {
            cursor: page_one_cursor,
            mode: SyncMode::Full,
        }]
    );
    assert_eq!(h.orchestrator.checkpoints().writes(), 1);

    let secured = report.secured_range.unwrap();
    assert_eq!(secured.to, date(2023, 11, 14));
}

#[tokio::test]
async fn test_next_cycle_resumes_interrupted_walk() {
    let h = Harness::new(70);
    h.feed.fail_page(1, vec![FetchError::Malformed("truncated body".into()); 3]);
    h.orchestrator.run_cycle(SyncMode::Full).await;
    let calls_before = h.feed.calls();

    let report = h.orchestrator.run_cycle(SyncMode::Incremental).await;

    assert_eq!(report.status, SyncStatus::Succeeded);
    assert_eq!(report.resumed_walks, 1);
    // Head page is known (1 request), then pages 2, 3 and the empty page
    assert_eq!(h.feed.calls() - calls_before, 4);
    assert_eq!(
        h.feed.cursors()[calls_before + 1],
        SyncCursor::new(30, BASE_TS - 29 * 3600)
    );
    assert_eq!(report.total_added(), 40);
    assert_eq!(h.stored_count(), 70);
    assert!(h.checkpoint().pending.is_empty());
    assert_eq!(report.pending_walks, 0);
}

#[tokio::test]
async fn test_auth_error_fails_without_retry() {
    let h = Harness::new(70);
    h.feed.fail_page(0, vec![FetchError::Auth("account not logged in".into())]);

    let report = h.orchestrator.run_cycle(SyncMode::Full).await;

    assert_eq!(report.status, SyncStatus::PartialFailure);
    assert_eq!(report.error.as_ref().unwrap().kind, ErrorKind::Auth);
    assert_eq!(report.fetch_calls, 1);
    assert!(h.clock.sleeps().is_empty());
    assert!(h.checkpoint().pending.is_empty());
}

#[tokio::test]
async fn test_second_trigger_is_rejected_while_running() {
    let h = Harness::new(70);
    let store = h.orchestrator.store();
    let _running = store.lock().await;

    let report = h.orchestrator.run_cycle(SyncMode::Incremental).await;

    assert_eq!(report.status, SyncStatus::AlreadyRunning);
    assert_eq!(report.error.as_ref().unwrap().kind, ErrorKind::AlreadyRunning);
    assert_eq!(h.feed.calls(), 0);
    assert_eq!(h.orchestrator.checkpoints().writes(), 0);
}

#[tokio::test]
async fn test_lock_file_held_by_other_process() {
    let h = Harness::new(70);
    let _other = RunLock::acquire(&h.dir.path().join("sync.lock"), chrono::Duration::minutes(30))
        .unwrap()
        .unwrap();

    let report = h.orchestrator.run_cycle(SyncMode::Full).await;

    assert_eq!(report.status, SyncStatus::AlreadyRunning);
    assert_eq!(h.feed.calls(), 0);
}

#[tokio::test]
async fn test_lock_released_after_cycle() {
    let h = Harness::new(10);
    h.orchestrator.run_cycle(SyncMode::Full).await;

    assert!(!h.dir.path().join("sync.lock").exists());
    let report = h.orchestrator.run_cycle(SyncMode::Incremental).await;
    assert_eq!(report.status, SyncStatus::Succeeded);
}

#[tokio::test]
async fn test_cancelled_cycle_reports_and_checkpoints() {
    let h = Harness::new(70);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = h
        .orchestrator
        .run_cycle_with_cancel(SyncMode::Full, cancel)
        .await;

    assert_eq!(report.error.as_ref().unwrap().kind, ErrorKind::Cancelled);
    assert_eq!(h.feed.calls(), 0);
    assert_eq!(h.orchestrator.checkpoints().writes(), 1);
}

#[tokio::test]
async fn test_cancel_between_pages_keeps_merged_pages() {
    let h = Harness::new(70);
    let cancel = CancellationToken::new();
    h.feed.cancel_on_call(2, cancel.clone());

    let report = h
        .orchestrator
        .run_cycle_with_cancel(SyncMode::Full, cancel)
        .await;

    assert_eq!(report.status, SyncStatus::PartialFailure);
    assert_eq!(report.stop_reason, Some(StopReason::Failed));
    assert_eq!(report.error.as_ref().unwrap().kind, ErrorKind::Cancelled);
    assert_eq!(report.fetch_calls, 2);
    assert_eq!(report.pages_merged, 1);
    assert_eq!(h.stored_count(), 30);

    let page_one_cursor = SyncCursor::new(30, BASE_TS - 29 * 3600);
    let checkpoint = h.checkpoint();
    assert_eq!(checkpoint.cursor, page_one_cursor);
    assert_eq!(
        checkpoint.pending,
        vec![PendingWalk {
            cursor: page_one_cursor,
            mode: SyncMode::Full,
        }]
    );
    assert_eq!(h.orchestrator.checkpoints().writes(), 1);
}

#[tokio::test]
async fn test_corrupt_bucket_stops_cycle_and_is_left_alone() {
    let h = Harness::new(70);
    let path = bucket_path_for(&h.dir.path().join("history"), date(2023, 11, 14));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "{ truncated").unwrap();

    let report = h.orchestrator.run_cycle(SyncMode::Full).await;

    assert_eq!(report.error.as_ref().unwrap().kind, ErrorKind::Storage);
    assert_eq!(report.pages_merged, 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ truncated");
}
