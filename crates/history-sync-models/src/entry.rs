use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::timezone::BucketTimeZone;

/// Kind of content a history entry points at.
///
/// Serialized with the remote feed's `business` tag so stored buckets stay
/// readable next to raw API dumps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ContentType {
    #[serde(rename = "archive")]
    Video,
    #[serde(rename = "pgc")]
    Episode,
    #[serde(rename = "live")]
    Live,
    #[serde(rename = "article")]
    Article,
    #[serde(rename = "article-list")]
    ArticleList,
    #[serde(rename = "cheese")]
    Course,
}

impl ContentType {
    pub fn from_business(business: &str) -> Option<Self> {
        match business {
            "archive" => Some(ContentType::Video),
            "pgc" => Some(ContentType::Episode),
            "live" => Some(ContentType::Live),
            "article" => Some(ContentType::Article),
            "article-list" => Some(ContentType::ArticleList),
            "cheese" => Some(ContentType::Course),
            _ => None,
        }
    }

    pub fn as_business(&self) -> &'static str {
        match self {
            ContentType::Video => "archive",
            ContentType::Episode => "pgc",
            ContentType::Live => "live",
            ContentType::Article => "article",
            ContentType::ArticleList => "article-list",
            ContentType::Course => "cheese",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_business())
    }
}

/// Composite identity of one watch event.
///
/// The same content legitimately recurs at different view times, so the
/// content id alone is not unique.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey {
    pub content_id: u64,
    pub view_at: i64,
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.content_id, self.view_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub content_id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bvid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_title: Option<String>,
    pub content_type: ContentType,
    pub author_id: u64,
    pub author_name: String,
    /// Seconds watched; the feed reports `-1` once playback reached the end.
    pub progress: i64,
    pub duration: i64,
    /// Epoch seconds, the natural ordering key of the feed.
    pub view_at: i64,
    /// Platform/device code (`dt` on the remote side).
    pub device: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    /// Human label assigned by the classifier when the entry is first stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl HistoryEntry {
    pub fn key(&self) -> EntryKey {
        EntryKey {
            content_id: self.content_id,
            view_at: self.view_at,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.progress == -1
    }

    /// Calendar date of the bucket this entry belongs to.
    pub fn bucket_date(&self, tz: &BucketTimeZone) -> Option<NaiveDate> {
        tz.date_of(self.view_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(content_id: u64, view_at: i64) -> HistoryEntry {
        HistoryEntry {
            content_id,
            bvid: Some("BV1xx411c7mD".to_string()),
            episode_id: None,
            cid: None,
            page: None,
            title: "test".to_string(),
            long_title: None,
            content_type: ContentType::Video,
            author_id: 1,
            author_name: "author".to_string(),
            progress: 30,
            duration: 120,
            view_at,
            device: 2,
            tag_name: None,
            category: None,
            cover: None,
            uri: None,
        }
    }

    #[test]
    fn test_key_distinguishes_repeat_views() {
        let first = entry(42, 1_700_000_000);
        let second = entry(42, 1_700_000_600);
        assert_ne!(first.key(), second.key());
        assert_eq!(first.key(), entry(42, 1_700_000_000).key());
    }

    #[test]
    fn test_content_type_business_tags() {
        for tag in ["archive", "pgc", "live", "article", "article-list", "cheese"] {
            let ct = ContentType::from_business(tag).unwrap();
            assert_eq!(ct.as_business(), tag);
        }
        assert!(ContentType::from_business("unknown").is_none());
    }

    #[test]
    fn test_entry_serializes_business_tag() {
        let json = serde_json::to_value(entry(1, 1)).unwrap();
        assert_eq!(json["content_type"], "archive");
        assert!(json.get("category").is_none());
    }

    #[test]
    fn test_finished_progress_marker() {
        let mut e = entry(1, 1);
        assert!(!e.is_finished());
        e.progress = -1;
        assert!(e.is_finished());
    }
}
