use history_sync_models::{ContentType, HistoryEntry, SyncCursor};
use serde::Deserialize;
use tracing::debug;

use crate::error::FetchError;
use crate::traits::FeedPage;

/// Response code for "not logged in".
pub const CODE_NOT_LOGGED_IN: i64 = -101;

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<HistoryData>,
}

#[derive(Debug, Deserialize)]
struct HistoryData {
    cursor: Option<RawCursor>,
    #[serde(default)]
    list: Option<Vec<RawItem>>,
}

#[derive(Debug, Deserialize)]
struct RawCursor {
    #[serde(default)]
    max: u64,
    #[serde(default)]
    view_at: i64,
    #[serde(default)]
    business: String,
}

#[derive(Debug, Deserialize)]
pub struct RawItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub long_title: String,
    #[serde(default)]
    pub show_title: String,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub uri: String,
    pub history: RawHistory,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_mid: u64,
    pub view_at: i64,
    #[serde(default)]
    pub progress: i64,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub tag_name: String,
}

#[derive(Debug, Deserialize)]
pub struct RawHistory {
    #[serde(default)]
    pub oid: u64,
    #[serde(default)]
    pub epid: u64,
    #[serde(default)]
    pub bvid: String,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub cid: u64,
    #[serde(default)]
    pub business: String,
    #[serde(default)]
    pub dt: u32,
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn non_zero(value: u64) -> Option<u64> {
    if value == 0 {
        None
    } else {
        Some(value)
    }
}

/// Normalise one raw item into a `HistoryEntry`, dispatching on its business tag.
pub fn decode_item(raw: RawItem) -> Result<HistoryEntry, FetchError> {
    let content_type = ContentType::from_business(&raw.history.business).ok_or_else(|| {
        FetchError::Malformed(format!(
            "unrecognised business type '{}' for item {}",
            raw.history.business, raw.history.oid
        ))
    })?;

    if raw.history.oid == 0 {
        return Err(FetchError::Malformed(format!(
            "{} item '{}' has no content id",
            content_type, raw.title
        )));
    }
    if raw.view_at <= 0 {
        return Err(FetchError::Malformed(format!(
            "item {} has invalid view_at {}",
            raw.history.oid, raw.view_at
        )));
    }

    let mut entry = HistoryEntry {
        content_id: raw.history.oid,
        bvid: None,
        episode_id: None,
        cid: None,
        page: None,
        title: raw.title.clone(),
        long_title: None,
        content_type,
        author_id: raw.author_mid,
        author_name: raw.author_name,
        progress: raw.progress,
        duration: raw.duration,
        view_at: raw.view_at,
        device: raw.history.dt,
        tag_name: None,
        category: None,
        cover: non_empty(&raw.cover),
        uri: non_empty(&raw.uri),
    };

    match content_type {
        ContentType::Video => {
            entry.bvid = non_empty(&raw.history.bvid);
            entry.cid = non_zero(raw.history.cid);
            entry.page = if raw.history.page == 0 { None } else { Some(raw.history.page) };
            entry.tag_name = non_empty(&raw.tag_name);
        }
        ContentType::Episode | ContentType::Course => {
            entry.bvid = non_empty(&raw.history.bvid);
            entry.episode_id = non_zero(raw.history.epid);
            entry.cid = non_zero(raw.history.cid);
            entry.long_title = non_empty(&raw.long_title).or_else(|| non_empty(&raw.show_title));
            entry.tag_name = non_empty(&raw.tag_name);
        }
        ContentType::Live => {
            // Live rooms have no meaningful playback position
            entry.progress = 0;
            entry.duration = 0;
            entry.tag_name = non_empty(&raw.tag_name);
        }
        ContentType::Article | ContentType::ArticleList => {
            entry.progress = 0;
            entry.duration = 0;
        }
    }

    Ok(entry)
}

/// Decode a full response body of the history cursor endpoint.
pub fn parse_history_page(body: &str) -> Result<FeedPage, FetchError> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| FetchError::Malformed(format!("failed to parse response: {}", e)))?;

    match envelope.code {
        0 => {}
        CODE_NOT_LOGGED_IN => {
            return Err(FetchError::Auth(format!(
                "session rejected ({}): {}",
                envelope.code, envelope.message
            )))
        }
        code => {
            return Err(FetchError::Transient(format!(
                "remote returned code {}: {}",
                code, envelope.message
            )))
        }
    }

    let data = envelope
        .data
        .ok_or_else(|| FetchError::Malformed("response has no data".to_string()))?;

    let next_cursor = data.cursor.map(|c| SyncCursor::new(c.max, c.view_at).with_business(c.business));

    let raw_items = data.list.unwrap_or_default();
    let items = raw_items
        .into_iter()
        .map(decode_item)
        .collect::<Result<Vec<_>, _>>()?;

    debug!("Decoded history page with {} items", items.len());
    Ok(FeedPage::new(items, next_cursor))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_json(business: &str, oid: u64, view_at: i64) -> String {
        format!(
            r#"{{
                "title": "title {oid}",
                "long_title": "",
                "cover": "http://i0.hdslb.com/{oid}.jpg",
                "uri": "",
                "history": {{"oid": {oid}, "epid": 0, "bvid": "BV1xx{oid}", "page": 1, "cid": 77, "part": "", "business": "{business}", "dt": 2}},
                "author_name": "uploader",
                "author_mid": 42,
                "view_at": {view_at},
                "progress": -1,
                "duration": 300,
                "tag_name": "单机游戏"
            }}"#
        )
    }

    fn page_json(items: &[String]) -> String {
        format!(
            r#"{{"code":0,"message":"0","ttl":1,"data":{{"cursor":{{"max":1001,"view_at":1700000000,"business":"archive","ps":30}},"tab":[],"list":[{}]}}}}"#,
            items.join(",")
        )
    }

    #[test]
    fn test_parse_video_page() {
        let body = page_json(&[item_json("archive", 1002, 1700000100), item_json("archive", 1001, 1700000000)]);
        let page = parse_history_page(&body).unwrap();

        assert_eq!(page.items.len(), 2);
        let first = &page.items[0];
        assert_eq!(first.content_id, 1002);
        assert_eq!(first.content_type, ContentType::Video);
        assert_eq!(first.bvid.as_deref(), Some("BV1xx1002"));
        assert_eq!(first.cid, Some(77));
        assert_eq!(first.page, Some(1));
        assert_eq!(first.device, 2);
        assert!(first.is_finished());
        assert_eq!(first.tag_name.as_deref(), Some("单机游戏"));
        assert_eq!(
            page.next_cursor,
            Some(SyncCursor::new(1001, 1700000000).with_business("archive"))
        );
    }

    #[test]
    fn test_live_item_drops_progress() {
        let body = page_json(&[item_json("live", 555, 1700000000)]);
        let page = parse_history_page(&body).unwrap();
        assert_eq!(page.items[0].content_type, ContentType::Live);
        assert_eq!(page.items[0].progress, 0);
        assert_eq!(page.items[0].duration, 0);
    }

    #[test]
    fn test_null_list_is_empty_page() {
        let body = r#"{"code":0,"message":"0","data":{"cursor":{"max":0,"view_at":0,"business":"","ps":30},"list":null}}"#;
        let page = parse_history_page(body).unwrap();
        assert!(page.is_empty());
    }

    #[test]
    fn test_not_logged_in_is_auth_error() {
        let body = r#"{"code":-101,"message":"账号未登录","ttl":1}"#;
        assert!(matches!(parse_history_page(body), Err(FetchError::Auth(_))));
    }

    #[test]
    fn test_other_codes_are_transient() {
        let body = r#"{"code":-412,"message":"请求被拦截"}"#;
        assert!(matches!(parse_history_page(body), Err(FetchError::Transient(_))));
    }

    #[test]
    fn test_unknown_business_is_malformed() {
        let body = page_json(&[item_json("archive", 1, 1700000000), item_json("hologram", 2, 1700000000)]);
        assert!(matches!(parse_history_page(&body), Err(FetchError::Malformed(_))));
    }

    #[test]
    fn test_missing_data_and_garbage_are_malformed() {
        assert!(matches!(
            parse_history_page(r#"{"code":0,"message":"0"}"#),
            Err(FetchError::Malformed(_))
        ));
        assert!(matches!(parse_history_page("<html>"), Err(FetchError::Malformed(_))));
    }
}
