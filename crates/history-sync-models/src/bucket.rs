use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::entry::{EntryKey, HistoryEntry};

/// All entries stored for one calendar day.
///
/// Entries keep encounter order, which is not necessarily chronological.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayBucket {
    pub date: NaiveDate,
    #[serde(default)]
    pub entries: Vec<HistoryEntry>,
}

impl DayBucket {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &EntryKey) -> bool {
        self.entries.iter().any(|e| e.key() == *key)
    }

    pub fn keys(&self) -> impl Iterator<Item = EntryKey> + '_ {
        self.entries.iter().map(|e| e.key())
    }
}
