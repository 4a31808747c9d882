//! RSS/Atom feed parser
//!
//! Fetches configured feed URLs and maps entries to content items. Feed
//! bodies are parsed with `feed-rs`, so both RSS 2.0 and Atom work through
//! the same path. Identity comes from the entry's canonical URL (guids are
//! per-feed, kept only as metadata), so the same article seen through two
//! feed URLs folds to one item.

use crate::error::{Error, Result};
use crate::ingest::parser::{ParseContext, ParseOutput, SourceLocation, SourceParser};
use crate::types::{ContentItem, ContentKind, Source};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;

use super::chat_log::truncate;

const FETCH_TIMEOUT_SECS: u64 = 30;

/// Parser for configured RSS/Atom feeds.
pub struct FeedParser {
    urls: Vec<String>,
}

impl FeedParser {
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }
}

impl SourceParser for FeedParser {
    fn source(&self) -> Source {
        Source::Rss
    }

    fn root_path(&self) -> Option<PathBuf> {
        None
    }

    fn is_available(&self) -> bool {
        !self.urls.is_empty()
    }

    fn discover(&self, _since: DateTime<Utc>) -> Result<Vec<SourceLocation>> {
        Ok(self
            .urls
            .iter()
            .map(|u| SourceLocation::Url(u.clone()))
            .collect())
    }

    fn parse(&self, ctx: &ParseContext) -> Result<ParseOutput> {
        let bytes = match ctx.location {
            SourceLocation::Url(url) => fetch_bytes(url)?,
            // File locations are accepted for archived feed snapshots.
            SourceLocation::Path(path) => std::fs::read(path)?,
        };

        let mut output = ParseOutput::default();
        match items_from_feed(&bytes, ctx.since) {
            Ok(items) => output.items = items,
            Err(e) => {
                output
                    .warnings
                    .push(format!("{}: skipped feed: {}", ctx.location.display(), e));
            }
        }
        Ok(output)
    }
}

/// Map one feed document to content items, dropping entries older than the
/// lookback cutoff (entries without a date are kept).
pub fn items_from_feed(bytes: &[u8], since: DateTime<Utc>) -> Result<Vec<ContentItem>> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| Error::Parse {
        source_name: Source::Rss.to_string(),
        message: format!("failed to parse feed: {}", e),
    })?;

    let site_name = feed.title.as_ref().map(|t| t.content.clone());
    let ingested_at = Utc::now();

    let items = feed
        .entries
        .into_iter()
        .filter(|entry| {
            entry
                .published
                .or(entry.updated)
                .map(|ts| ts >= since)
                .unwrap_or(true)
        })
        .map(|entry| {
            let title = entry.title.map(|t| t.content).unwrap_or_default();
            let url = entry.links.first().map(|l| l.href.clone());
            let body = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .unwrap_or_default();
            let published: Option<DateTime<Utc>> = entry.published.or(entry.updated);
            let author = entry.authors.first().map(|a| a.name.clone());

            let excerpt = truncate(body.trim(), 200).to_string();
            let metadata = serde_json::json!({ "guid": entry.id });

            ContentItem {
                id: String::new(),
                source: Source::Rss,
                kind: ContentKind::Article,
                title,
                body,
                excerpt,
                url,
                author,
                site_name: site_name.clone(),
                published_at: published,
                ingested_at,
                tags: Default::default(),
                topics: Default::default(),
                project: None,
                metadata,
            }
        })
        .collect();

    Ok(items)
}

fn fetch_bytes(url: &str) -> Result<Vec<u8>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::SourceUnavailable {
            source_name: Source::Rss.to_string(),
            message: format!("failed to build runtime: {}", e),
        })?;

    runtime.block_on(async {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::SourceUnavailable {
                source_name: Source::Rss.to_string(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        let response = client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::SourceUnavailable {
                source_name: Source::Rss.to_string(),
                message: format!("{}: {}", url, e),
            })?;

        let bytes = response.bytes().await.map_err(|e| Error::SourceUnavailable {
            source_name: Source::Rss.to_string(),
            message: format!("{}: failed to read body: {}", url, e),
        })?;

        Ok(bytes.to_vec())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS2: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0">
          <channel>
            <title>Systems Weekly</title>
            <item>
              <title>Fan-in parsers in practice</title>
              <link>https://example.com/fan-in</link>
              <guid>https://example.com/fan-in</guid>
              <description>Merging heterogeneous log formats.</description>
              <pubDate>Sun, 08 Feb 2026 08:00:00 GMT</pubDate>
            </item>
            <item>
              <title>Old news</title>
              <link>https://example.com/old</link>
              <pubDate>Mon, 01 Jan 2001 00:00:00 GMT</pubDate>
            </item>
          </channel>
        </rss>"#;

    #[test]
    fn maps_rss2_entries() {
        let since = DateTime::parse_from_rfc3339("2026-02-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let items = items_from_feed(RSS2.as_bytes(), since).unwrap();

        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.title, "Fan-in parsers in practice");
        assert_eq!(item.url.as_deref(), Some("https://example.com/fan-in"));
        assert_eq!(item.site_name.as_deref(), Some("Systems Weekly"));
        assert_eq!(item.kind, ContentKind::Article);
        assert!(item.published_at.is_some());
    }

    #[test]
    fn maps_atom_entries() {
        let atom = r#"<?xml version="1.0" encoding="UTF-8"?>
        <feed xmlns="http://www.w3.org/2005/Atom">
          <title>Notes</title>
          <entry>
            <id>urn:notes:42</id>
            <title>Atom Entry</title>
            <link href="https://example.com/atom/42"/>
            <summary>A summary</summary>
            <updated>2026-02-08T00:00:00Z</updated>
          </entry>
        </feed>"#;

        let since = DateTime::parse_from_rfc3339("2026-02-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let items = items_from_feed(atom.as_bytes(), since).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].metadata["guid"], "urn:notes:42");
        assert!(items[0].native_id().is_none());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let since = Utc::now();
        assert!(items_from_feed(b"not a feed", since).is_err());
    }

    #[test]
    fn discover_lists_configured_urls() {
        let parser = FeedParser::new(vec!["https://example.com/feed.xml".to_string()]);
        let locations = parser.discover(Utc::now()).unwrap();
        assert_eq!(
            locations,
            vec![SourceLocation::Url("https://example.com/feed.xml".to_string())]
        );
        assert!(parser.is_available());
        assert!(!FeedParser::new(vec![]).is_available());
    }
}
