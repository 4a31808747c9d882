//! Normalizer and dedup
//!
//! Takes the raw records produced by all parsers, assigns every record its
//! stable id, folds duplicates, and buckets by calendar date in the
//! configured timezone.
//!
//! ## Identity
//!
//! The id is a deterministic function of source fields, tried in priority
//! order:
//!
//! 1. `(source, native id)` when the source provides a stable identifier
//! 2. the sha256 of the normalized URL when one is present
//! 3. the sha256 of `source|title|date|first 512 body bytes`
//!
//! Parsing the same input twice therefore yields byte-identical ids, and
//! the same article seen through two feeds folds to one item.

use crate::types::{ContentItem, Session, Source};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Metadata key recording every source a folded duplicate arrived from.
pub const META_AVAILABLE_SOURCES: &str = "available_sources";

/// Result of normalizing one run's parser output.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    /// Unique non-session items, bucketed by calendar date
    pub items_by_date: BTreeMap<NaiveDate, Vec<ContentItem>>,
    /// Unique sessions, bucketed by calendar date
    pub sessions_by_date: BTreeMap<NaiveDate, Vec<Session>>,
    /// Records dropped as duplicates
    pub duplicates: usize,
}

/// Assign ids, fold duplicates, and bucket everything by date.
pub fn normalize(
    mut items: Vec<ContentItem>,
    mut sessions: Vec<Session>,
    tz_offset_minutes: i32,
) -> NormalizedBatch {
    for item in &mut items {
        item.id = derive_id(item);
    }
    for session in &mut sessions {
        session.item.id = derive_id(&session.item);
    }

    let mut batch = NormalizedBatch::default();

    let mut seen_items: BTreeMap<String, ContentItem> = BTreeMap::new();
    for item in items {
        match seen_items.get_mut(&item.id) {
            Some(existing) => {
                fold_duplicate(existing, item);
                batch.duplicates += 1;
            }
            None => {
                let mut item = item;
                note_source(&mut item);
                seen_items.insert(item.id.clone(), item);
            }
        }
    }

    let mut seen_sessions: BTreeMap<String, Session> = BTreeMap::new();
    for session in sessions {
        match seen_sessions.get_mut(&session.item.id) {
            Some(existing) => {
                fold_duplicate(&mut existing.item, session.item);
                batch.duplicates += 1;
            }
            None => {
                let mut session = session;
                note_source(&mut session.item);
                seen_sessions.insert(session.item.id.clone(), session);
            }
        }
    }

    for item in seen_items.into_values() {
        let date = bucket_date(item.published_at, None, item.ingested_at, tz_offset_minutes);
        batch.items_by_date.entry(date).or_default().push(item);
    }
    for session in seen_sessions.into_values() {
        let date = bucket_date(
            None,
            Some(session.started_at),
            session.item.ingested_at,
            tz_offset_minutes,
        );
        batch.sessions_by_date.entry(date).or_default().push(session);
    }

    // Within a date, order is stable by id so repeated runs agree.
    for sessions in batch.sessions_by_date.values_mut() {
        sessions.sort_by(|a, b| a.item.id.cmp(&b.item.id));
    }
    for items in batch.items_by_date.values_mut() {
        items.sort_by(|a, b| a.id.cmp(&b.id));
    }

    batch
}

/// Derive the stable id for an item from its source fields.
pub fn derive_id(item: &ContentItem) -> String {
    let digest = if let Some(native) = item.native_id() {
        hash(&format!("{}|{}", item.source.as_str(), native))
    } else if let Some(url) = item.url.as_deref() {
        hash(&normalize_url(url))
    } else {
        let date = item
            .published_at
            .unwrap_or(item.ingested_at)
            .date_naive()
            .to_string();
        let head = first_bytes(&item.body, 512);
        hash(&format!(
            "{}|{}|{}|{}",
            item.source.as_str(),
            item.title,
            date,
            head
        ))
    };
    format!("{}-{}", item.source.as_str(), &digest[..16])
}

/// Canonical form of a URL for identity purposes: lowercase scheme and host,
/// no `www.` prefix, no fragment, no tracking parameters, no trailing slash.
pub fn normalize_url(url: &str) -> String {
    let url = url.split('#').next().unwrap_or(url);

    let (scheme, rest) = match url.split_once("://") {
        Some((s, r)) => (s.to_lowercase(), r),
        None => return url.trim_end_matches('/').to_string(),
    };

    let (host_path, query) = match rest.split_once('?') {
        Some((hp, q)) => (hp, Some(q)),
        None => (rest, None),
    };

    let (host, path) = match host_path.split_once('/') {
        Some((h, p)) => (h, Some(p)),
        None => (host_path, None),
    };
    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let mut out = format!("{}://{}", scheme, host);
    if let Some(path) = path {
        out.push('/');
        out.push_str(path);
    }

    if let Some(query) = query {
        let kept: Vec<&str> = query
            .split('&')
            .filter(|pair| {
                let key = pair.split('=').next().unwrap_or("");
                !key.starts_with("utm_") && key != "fbclid" && key != "ref"
            })
            .collect();
        if !kept.is_empty() {
            out.push('?');
            out.push_str(&kept.join("&"));
        }
    }

    out.trim_end_matches('/').to_string()
}

/// Date bucket for a record: published time for external content, start time
/// for sessions, ingest time as the fallback.
pub fn bucket_date(
    published_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    ingested_at: DateTime<Utc>,
    tz_offset_minutes: i32,
) -> NaiveDate {
    let instant = started_at.or(published_at).unwrap_or(ingested_at);
    let offset = FixedOffset::east_opt(tz_offset_minutes * 60)
        .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset"));
    instant.with_timezone(&offset).date_naive()
}

/// Fold a duplicate into the first-seen record: `ingested_at` keeps the
/// first write, mutable metadata takes the last, and the duplicate's source
/// is noted.
fn fold_duplicate(existing: &mut ContentItem, duplicate: ContentItem) {
    let first_ingested = existing.ingested_at.min(duplicate.ingested_at);

    if let (Some(existing_map), Some(dup_map)) =
        (existing.metadata.as_object_mut(), duplicate.metadata.as_object())
    {
        for (key, value) in dup_map {
            if key == META_AVAILABLE_SOURCES {
                continue;
            }
            existing_map.insert(key.clone(), value.clone());
        }
    }
    existing.tags.extend(duplicate.tags);
    existing.topics.extend(duplicate.topics);
    existing.ingested_at = first_ingested;

    append_source(existing, duplicate.source);
}

fn note_source(item: &mut ContentItem) {
    let source = item.source;
    append_source(item, source);
}

fn append_source(item: &mut ContentItem, source: Source) {
    let sources = item
        .metadata
        .as_object_mut()
        .map(|m| {
            m.entry(META_AVAILABLE_SOURCES)
                .or_insert_with(|| serde_json::json!([]))
        })
        .and_then(|v| v.as_array_mut());
    if let Some(sources) = sources {
        let name = serde_json::Value::String(source.as_str().to_string());
        if !sources.contains(&name) {
            sources.push(name);
        }
    }
}

fn first_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentKind, META_NATIVE_ID};
    use std::collections::BTreeSet;

    fn item(source: Source, native: Option<&str>, url: Option<&str>, title: &str) -> ContentItem {
        let metadata = match native {
            Some(id) => serde_json::json!({ META_NATIVE_ID: id }),
            None => serde_json::json!({}),
        };
        ContentItem {
            id: String::new(),
            source,
            kind: ContentKind::Article,
            title: title.to_string(),
            body: "body text".to_string(),
            excerpt: String::new(),
            url: url.map(str::to_string),
            author: None,
            site_name: None,
            published_at: Some(Utc::now()),
            ingested_at: Utc::now(),
            tags: BTreeSet::new(),
            topics: BTreeSet::new(),
            project: None,
            metadata,
        }
    }

    #[test]
    fn id_is_deterministic() {
        let a = item(Source::Rss, Some("guid-1"), None, "A");
        let b = item(Source::Rss, Some("guid-1"), None, "A");
        assert_eq!(derive_id(&a), derive_id(&b));
        assert!(derive_id(&a).starts_with("rss-"));
    }

    #[test]
    fn id_priority_prefers_native_id_over_url() {
        let with_native = item(Source::Rss, Some("guid-1"), Some("https://example.com/a"), "A");
        let url_only = item(Source::Rss, None, Some("https://example.com/a"), "A");
        assert_ne!(derive_id(&with_native), derive_id(&url_only));
    }

    #[test]
    fn url_normalization_folds_variants() {
        assert_eq!(
            normalize_url("https://www.Example.com/post/?utm_source=feed#frag"),
            normalize_url("https://example.com/post")
        );
        assert_eq!(
            normalize_url("https://example.com/a?keep=1&utm_medium=x"),
            "https://example.com/a?keep=1"
        );
    }

    #[test]
    fn same_canonical_url_dedupes() {
        let a = item(Source::Rss, None, Some("https://example.com/post"), "A");
        let b = item(
            Source::Rss,
            None,
            Some("https://www.example.com/post/#top"),
            "A mirror",
        );
        let batch = normalize(vec![a, b], vec![], 0);
        assert_eq!(batch.duplicates, 1);
        let items: Vec<_> = batch.items_by_date.values().flatten().collect();
        assert_eq!(items.len(), 1);
        let sources = items[0].metadata[META_AVAILABLE_SOURCES].as_array().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0], "rss");
    }

    #[test]
    fn first_write_wins_on_ingested_at() {
        let mut a = item(Source::Rss, Some("g"), None, "A");
        let mut b = item(Source::Rss, Some("g"), None, "A");
        a.ingested_at = Utc::now() - chrono::Duration::hours(2);
        b.ingested_at = Utc::now();
        let early = a.ingested_at;
        let batch = normalize(vec![b, a], vec![], 0);
        let items: Vec<_> = batch.items_by_date.values().flatten().collect();
        assert_eq!(items[0].ingested_at, early);
    }

    #[test]
    fn bucket_uses_timezone_offset() {
        // 2026-02-09T02:00Z is still 2026-02-08 at UTC-5
        let instant = DateTime::parse_from_rfc3339("2026-02-09T02:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            bucket_date(Some(instant), None, instant, -300),
            NaiveDate::from_ymd_opt(2026, 2, 8).unwrap()
        );
        assert_eq!(
            bucket_date(Some(instant), None, instant, 0),
            NaiveDate::from_ymd_opt(2026, 2, 9).unwrap()
        );
    }

    #[test]
    fn missing_dates_fall_back_to_ingested() {
        let ingested = DateTime::parse_from_rfc3339("2026-02-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            bucket_date(None, None, ingested, 0),
            NaiveDate::from_ymd_opt(2026, 2, 10).unwrap()
        );
    }
}
