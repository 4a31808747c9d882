//! Browser history parser
//!
//! Reads browsing activity from history databases in the Firefox places
//! shape (`moz_places` joined to `moz_historyvisits`). Visits inside the
//! lookback window become content items so reading activity can feed the
//! daily digest and journal context.
//!
//! The database is opened read-only; a locked or missing profile is a
//! source-level failure and never blocks other sources.

use crate::error::{Error, Result};
use crate::ingest::parser::{ParseContext, ParseOutput, SourceLocation, SourceParser};
use crate::types::{ContentItem, ContentKind, Source, META_NATIVE_ID};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OpenFlags};
use std::path::PathBuf;

use super::chat_log::truncate;

/// Parser for browser history SQLite profiles.
pub struct BrowserHistoryParser {
    profiles: Vec<PathBuf>,
}

impl BrowserHistoryParser {
    pub fn new(profiles: Vec<PathBuf>) -> Self {
        Self { profiles }
    }
}

impl SourceParser for BrowserHistoryParser {
    fn source(&self) -> Source {
        Source::Browser
    }

    fn root_path(&self) -> Option<PathBuf> {
        None
    }

    fn is_available(&self) -> bool {
        self.profiles.iter().any(|p| p.exists())
    }

    fn discover(&self, _since: DateTime<Utc>) -> Result<Vec<SourceLocation>> {
        Ok(self
            .profiles
            .iter()
            .filter(|p| p.exists())
            .map(|p| SourceLocation::Path(p.clone()))
            .collect())
    }

    fn parse(&self, ctx: &ParseContext) -> Result<ParseOutput> {
        let path = match ctx.location {
            SourceLocation::Path(p) => p,
            SourceLocation::Url(u) => {
                return Err(Error::Parse {
                    source_name: self.source().to_string(),
                    message: format!("browser parser cannot read URL {}", u),
                })
            }
        };

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| Error::SourceUnavailable {
                source_name: self.source().to_string(),
                message: format!("{}: {}", path.display(), e),
            })?;

        let mut output = ParseOutput::default();
        // places timestamps are microseconds since the epoch
        let since_us = ctx.since.timestamp_micros();

        let mut stmt = conn
            .prepare(
                "SELECT p.url, p.title, v.visit_date
                 FROM moz_places p
                 JOIN moz_historyvisits v ON v.place_id = p.id
                 WHERE v.visit_date >= ?1
                 ORDER BY v.visit_date ASC",
            )
            .map_err(|e| Error::SourceUnavailable {
                source_name: self.source().to_string(),
                message: format!("{}: unexpected schema: {}", path.display(), e),
            })?;

        let rows = stmt
            .query_map([since_us], |row| {
                let url: String = row.get(0)?;
                let title: Option<String> = row.get(1)?;
                let visit_date: i64 = row.get(2)?;
                Ok((url, title, visit_date))
            })
            .map_err(|e| Error::SourceUnavailable {
                source_name: self.source().to_string(),
                message: format!("{}: query failed: {}", path.display(), e),
            })?;

        let ingested_at = Utc::now();
        for row in rows {
            if ctx.cancelled() {
                output
                    .warnings
                    .push(format!("{}: parsing cancelled", path.display()));
                break;
            }
            let (url, title, visit_date) = match row {
                Ok(r) => r,
                Err(e) => {
                    output
                        .warnings
                        .push(format!("{}: bad history row: {}", path.display(), e));
                    continue;
                }
            };

            if !url.starts_with("http://") && !url.starts_with("https://") {
                continue;
            }

            let visited_at = Utc
                .timestamp_micros(visit_date)
                .single()
                .unwrap_or(ingested_at);
            let title = title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| truncate(&url, 80).to_string());

            output.items.push(ContentItem {
                id: String::new(),
                source: Source::Browser,
                kind: ContentKind::Article,
                title,
                body: String::new(),
                excerpt: String::new(),
                url: Some(url.clone()),
                author: None,
                site_name: host_of(&url),
                published_at: Some(visited_at),
                ingested_at,
                tags: Default::default(),
                topics: Default::default(),
                project: None,
                metadata: serde_json::json!({ META_NATIVE_ID: format!("{}@{}", url, visit_date) }),
            });
        }

        Ok(output)
    }
}

fn host_of(url: &str) -> Option<String> {
    let rest = url.split("://").nth(1)?;
    let host = rest.split('/').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
