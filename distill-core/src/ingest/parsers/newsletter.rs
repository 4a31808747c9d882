//! Newsletter export parser
//!
//! Reads Substack-style export directories: a `posts.csv` index plus
//! optional `<post_id>.html` bodies alongside it. Rows become content items;
//! unpublished drafts are skipped.

use crate::error::{Error, Result};
use crate::ingest::parser::{ParseContext, ParseOutput, SourceLocation, SourceParser};
use crate::types::{ContentItem, ContentKind, Source, META_NATIVE_ID};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::chat_log::truncate;

/// Parser for newsletter export directories.
pub struct NewsletterExportParser {
    exports: Vec<PathBuf>,
}

impl NewsletterExportParser {
    pub fn new(exports: Vec<PathBuf>) -> Self {
        Self { exports }
    }
}

#[derive(Debug, Deserialize)]
struct PostRow {
    post_id: String,
    title: String,
    #[serde(default)]
    subtitle: String,
    #[serde(default)]
    is_published: bool,
    #[serde(default)]
    date: String,
    #[serde(default)]
    url: String,
}

impl SourceParser for NewsletterExportParser {
    fn source(&self) -> Source {
        Source::Substack
    }

    fn root_path(&self) -> Option<PathBuf> {
        None
    }

    fn is_available(&self) -> bool {
        self.exports.iter().any(|p| p.join("posts.csv").exists())
    }

    fn discover(&self, _since: DateTime<Utc>) -> Result<Vec<SourceLocation>> {
        Ok(self
            .exports
            .iter()
            .filter(|p| p.join("posts.csv").exists())
            .map(|p| SourceLocation::Path(p.clone()))
            .collect())
    }

    fn parse(&self, ctx: &ParseContext) -> Result<ParseOutput> {
        let dir = match ctx.location {
            SourceLocation::Path(p) => p,
            SourceLocation::Url(u) => {
                return Err(Error::Parse {
                    source_name: self.source().to_string(),
                    message: format!("newsletter parser cannot read URL {}", u),
                })
            }
        };

        let index = dir.join("posts.csv");
        let mut reader = csv::Reader::from_path(&index).map_err(|e| Error::SourceUnavailable {
            source_name: self.source().to_string(),
            message: format!("{}: {}", index.display(), e),
        })?;

        let mut output = ParseOutput::default();
        let ingested_at = Utc::now();

        for (line, record) in reader.deserialize::<PostRow>().enumerate() {
            if ctx.cancelled() {
                output
                    .warnings
                    .push(format!("{}: parsing cancelled", index.display()));
                break;
            }
            let row = match record {
                Ok(r) => r,
                Err(e) => {
                    output
                        .warnings
                        .push(format!("{}: row {}: {}", index.display(), line + 2, e));
                    continue;
                }
            };
            if !row.is_published {
                continue;
            }

            let published_at = parse_date(&row.date);
            let body = read_body(dir, &row.post_id).unwrap_or_else(|| row.subtitle.clone());
            let excerpt = if row.subtitle.is_empty() {
                truncate(body.trim(), 200).to_string()
            } else {
                row.subtitle.clone()
            };

            output.items.push(ContentItem {
                id: String::new(),
                source: Source::Substack,
                kind: ContentKind::Article,
                title: row.title,
                body,
                excerpt,
                url: if row.url.is_empty() { None } else { Some(row.url) },
                author: None,
                site_name: None,
                published_at,
                ingested_at,
                tags: Default::default(),
                topics: Default::default(),
                project: None,
                metadata: serde_json::json!({ META_NATIVE_ID: row.post_id }),
            });
        }

        Ok(output)
    }
}

fn read_body(dir: &Path, post_id: &str) -> Option<String> {
    let html = std::fs::read_to_string(dir.join(format!("{}.html", post_id))).ok()?;
    Some(strip_tags(&html))
}

/// Collapse HTML to visible text. Good enough for prompt context; this is
/// not a sanitizer.
fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                if !text.ends_with(' ') && !text.is_empty() {
                    text.push(' ');
                }
            }
            c if !in_tag => text.push(c),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
