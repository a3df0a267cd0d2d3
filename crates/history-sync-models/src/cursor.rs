use serde::{Deserialize, Serialize};

/// Resumption token for the cursor-paginated history feed.
///
/// `max` and `view_at` are the id and view time of the oldest item seen so far;
/// the empty cursor requests the newest page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncCursor {
    pub max: u64,
    pub view_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business: Option<String>,
}

impl SyncCursor {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(max: u64, view_at: i64) -> Self {
        Self {
            max,
            view_at,
            business: None,
        }
    }

    pub fn with_business(mut self, business: impl Into<String>) -> Self {
        let business = business.into();
        self.business = if business.is_empty() { None } else { Some(business) };
        self
    }

    pub fn is_empty(&self) -> bool {
        self.max == 0 && self.view_at == 0
    }
}
