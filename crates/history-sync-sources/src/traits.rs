use async_trait::async_trait;
use history_sync_models::{HistoryEntry, SyncCursor};

use crate::error::FetchError;

/// One page of the remote feed, newest first.
#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    pub items: Vec<HistoryEntry>,
    /// Cursor reported by the remote, if it sent a usable one.
    pub next_cursor: Option<SyncCursor>,
}

impl FeedPage {
    pub fn new(items: Vec<HistoryEntry>, next_cursor: Option<SyncCursor>) -> Self {
        Self { items, next_cursor }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Cursor for the next (older) page.
    ///
    /// Prefers the remote's own cursor and falls back to the oldest item in the
    /// page, keeping the business hint of `current`.
    pub fn advance_from(&self, current: &SyncCursor) -> Option<SyncCursor> {
        if let Some(next) = self.next_cursor.as_ref().filter(|c| !c.is_empty()) {
            return Some(next.clone());
        }
        let oldest = self.items.iter().min_by_key(|e| (e.view_at, e.content_id))?;
        let mut cursor = SyncCursor::new(oldest.content_id, oldest.view_at);
        cursor.business = current.business.clone();
        Some(cursor)
    }
}

#[async_trait]
pub trait HistoryFeed: Send + Sync {
    fn source_name(&self) -> &str;

    /// Fetch the page that starts right after `cursor`; the empty cursor yields the newest page.
    async fn fetch_page(&self, cursor: &SyncCursor) -> Result<FeedPage, FetchError>;
}
