//! `format=json` listings
//!
//! Swift pages listings with a marker: the next page starts after the last
//! name returned. A page shorter than the requested limit is the last one.

use jiff::Timestamp;
use jiff::civil::DateTime;
use jiff::tz::TimeZone;
use serde::Deserialize;

use osc_core::{ContainerInfo, ListPage, ListingEntry, ObjectInfo, Result, SubdirInfo};

/// Entry of an account listing; object counts and sizes are ignored
#[derive(Debug, Deserialize)]
struct RawContainer {
    name: String,
}

/// Entry of a container listing
///
/// With a delimiter, grouped names come back as `{"subdir": ...}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Subdir {
        subdir: String,
    },
    Object {
        name: String,
        bytes: u64,
        #[serde(default)]
        hash: Option<String>,
        #[serde(default)]
        content_type: Option<String>,
        #[serde(default)]
        last_modified: Option<String>,
    },
}

impl RawEntry {
    fn marker(&self) -> &str {
        match self {
            RawEntry::Subdir { subdir } => subdir,
            RawEntry::Object { name, .. } => name,
        }
    }
}

impl From<RawEntry> for ListingEntry {
    fn from(raw: RawEntry) -> Self {
        match raw {
            RawEntry::Subdir { subdir } => ListingEntry::Subdir(SubdirInfo { prefix: subdir }),
            RawEntry::Object {
                name,
                bytes,
                hash,
                content_type,
                last_modified,
            } => {
                let mut info = ObjectInfo::new(name, bytes);
                if let Some(hash) = hash {
                    info = info.with_etag(&hash);
                }
                info.content_type = content_type;
                info.last_modified = last_modified.as_deref().and_then(parse_listing_time);
                ListingEntry::Object(info)
            }
        }
    }
}

/// Listing timestamps are UTC without an offset, e.g. `2024-03-01T10:20:30.123456`
pub(crate) fn parse_listing_time(value: &str) -> Option<Timestamp> {
    if let Ok(ts) = value.parse::<Timestamp>() {
        return Some(ts);
    }
    let civil: DateTime = value.parse().ok()?;
    civil.to_zoned(TimeZone::UTC).ok().map(|z| z.timestamp())
}

/// `Last-Modified` header value, an HTTP date
pub(crate) fn parse_http_date(value: &str) -> Option<Timestamp> {
    jiff::fmt::rfc2822::parse(value).ok().map(|z| z.timestamp())
}

fn next_marker(count: usize, limit: usize, last: Option<&str>) -> Option<String> {
    if count < limit {
        return None;
    }
    last.map(str::to_string)
}

/// Parse one page of an account listing
pub(crate) fn container_page(body: &[u8], limit: usize) -> Result<ListPage<ContainerInfo>> {
    if body.is_empty() {
        return Ok(ListPage::default());
    }
    let raw: Vec<RawContainer> = serde_json::from_slice(body)?;
    let next_token = next_marker(raw.len(), limit, raw.last().map(|c| c.name.as_str()));

    let items = raw.into_iter().map(|c| ContainerInfo::new(c.name)).collect();
    Ok(ListPage { items, next_token })
}

/// Parse one page of a container listing
pub(crate) fn object_page(body: &[u8], limit: usize) -> Result<ListPage<ListingEntry>> {
    if body.is_empty() {
        return Ok(ListPage::default());
    }
    let raw: Vec<RawEntry> = serde_json::from_slice(body)?;
    let next_token = next_marker(raw.len(), limit, raw.last().map(RawEntry::marker));

    Ok(ListPage {
        items: raw.into_iter().map(ListingEntry::from).collect(),
        next_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_page_with_subdirs() {
        let body = br#"[
            {"subdir": "logs/"},
            {"name": "readme.txt", "bytes": 12, "hash": "abc", "content_type": "text/plain",
             "last_modified": "2024-03-01T10:20:30.123456"}
        ]"#;
        let page = object_page(body, 2).unwrap();

        assert_eq!(page.items.len(), 2);
        assert!(page.items[0].is_subdir());
        assert_eq!(page.items[0].name(), "logs/");

        let object = page.items[1].as_object().unwrap();
        assert_eq!(object.size_bytes, Some(12));
        assert_eq!(object.etag.as_deref(), Some("abc"));
        assert_eq!(object.content_type.as_deref(), Some("text/plain"));
        assert_eq!(
            object.last_modified.map(|t| t.as_second()),
            Some(1_709_288_430)
        );

        // A full page continues after its last entry
        assert_eq!(page.next_token.as_deref(), Some("readme.txt"));
    }

    #[test]
    fn test_short_page_is_last() {
        let body = br#"[{"name": "a", "bytes": 0}]"#;
        let page = object_page(body, 1000).unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.next_token.is_none());
    }

    #[test]
    fn test_subdir_can_be_marker() {
        let body = br#"[{"name": "a", "bytes": 1}, {"subdir": "b/"}]"#;
        let page = object_page(body, 2).unwrap();
        assert_eq!(page.next_token.as_deref(), Some("b/"));
    }

    #[test]
    fn test_empty_body_is_empty_page() {
        assert!(object_page(b"", 10).unwrap().items.is_empty());
        assert!(container_page(b"[]", 10).unwrap().next_token.is_none());
    }

    #[test]
    fn test_container_page() {
        let body = br#"[{"name": "photos", "count": 3, "bytes": 1024}, {"name": "videos", "count": 0, "bytes": 0}]"#;
        let page = container_page(body, 2).unwrap();
        let names: Vec<&str> = page.items.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["photos", "videos"]);
        assert_eq!(page.next_token.as_deref(), Some("videos"));
    }

    #[test]
    fn test_malformed_listing() {
        assert!(object_page(b"<html>", 10).is_err());
    }

    #[test]
    fn test_parse_http_date() {
        let ts = parse_http_date("Fri, 01 Mar 2024 10:20:30 GMT").unwrap();
        assert_eq!(ts.as_second(), 1_709_288_430);
        assert!(parse_http_date("yesterday").is_none());
    }
}
