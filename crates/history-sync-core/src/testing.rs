//! Fixtures shared by the unit and scenario tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use history_sync_models::{ContentType, HistoryEntry, SyncCursor};
use history_sync_sources::{FeedPage, FetchError, HistoryFeed};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// 2023-11-14T22:13:20Z
pub const BASE_TS: i64 = 1_700_000_000;

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn entry(content_id: u64, view_at: i64) -> HistoryEntry {
    HistoryEntry {
        content_id,
        bvid: Some(format!("BV{}", content_id)),
        episode_id: None,
        cid: Some(content_id * 10),
        page: Some(1),
        title: format!("video {}", content_id),
        long_title: None,
        content_type: ContentType::Video,
        author_id: 42,
        author_name: "uploader".to_string(),
        progress: 30,
        duration: 600,
        view_at,
        device: 1,
        tag_name: Some("单机游戏".to_string()),
        category: None,
        cover: None,
        uri: None,
    }
}

/// `count` entries one hour apart, newest first, ids starting at `first_id`.
pub fn hourly_entries(first_id: u64, newest_ts: i64, count: usize) -> Vec<HistoryEntry> {
    (0..count)
        .map(|i| entry(first_id + i as u64, newest_ts - i as i64 * 3600))
        .collect()
}

/// In-memory feed serving a fixed history in pages, with scripted failures.
pub struct PagedFeed {
    items: Mutex<Vec<HistoryEntry>>,
    page_size: usize,
    failures: Mutex<HashMap<usize, VecDeque<FetchError>>>,
    calls: Mutex<Vec<SyncCursor>>,
    cancel_on_call: Mutex<Option<(usize, CancellationToken)>>,
}

impl PagedFeed {
    pub fn new(items: Vec<HistoryEntry>, page_size: usize) -> Self {
        let feed = Self {
            items: Mutex::new(Vec::new()),
            page_size,
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            cancel_on_call: Mutex::new(None),
        };
        feed.prepend(items);
        feed
    }

    /// Add newer history, as if the user kept watching.
    pub fn prepend(&self, items: Vec<HistoryEntry>) {
        let mut all = self.items.lock().unwrap();
        all.extend(items);
        all.sort_by(|a, b| (b.view_at, b.content_id).cmp(&(a.view_at, a.content_id)));
    }

    /// Make the next `errors.len()` requests for page `page` fail, in order.
    pub fn fail_page(&self, page: usize, errors: Vec<FetchError>) {
        self.failures
            .lock()
            .unwrap()
            .entry(page)
            .or_default()
            .extend(errors);
    }

    /// Cancel `token` while request number `call` (1-based) is in flight.
    pub fn cancel_on_call(&self, call: usize, token: CancellationToken) {
        *self.cancel_on_call.lock().unwrap() = Some((call, token));
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn cursors(&self) -> Vec<SyncCursor> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryFeed for PagedFeed {
    fn source_name(&self) -> &str {
        "paged"
    }

    async fn fetch_page(&self, cursor: &SyncCursor) -> Result<FeedPage, FetchError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(cursor.clone());
            calls.len()
        };
        if let Some((at, token)) = self.cancel_on_call.lock().unwrap().as_ref() {
            if *at == call {
                token.cancel();
            }
        }
        let items = self.items.lock().unwrap();

        let start = if cursor.is_empty() {
            0
        } else {
            items
                .iter()
                .position(|e| (e.view_at, e.content_id) < (cursor.view_at, cursor.max))
                .unwrap_or(items.len())
        };

        let page_index = start / self.page_size;
        if let Some(error) = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&page_index)
            .and_then(|queue| queue.pop_front())
        {
            return Err(error);
        }

        let end = (start + self.page_size).min(items.len());
        let page: Vec<HistoryEntry> = items[start..end].to_vec();
        let next_cursor = page
            .last()
            .map(|e| SyncCursor::new(e.content_id, e.view_at));
        Ok(FeedPage::new(page, next_cursor))
    }
}
