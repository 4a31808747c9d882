//! Parser trait abstraction
//!
//! All source parsers implement the [`SourceParser`] trait to provide a
//! unified interface for discovering source locations and parsing records.
//!
//! ## Design Principles
//!
//! 1. **Soft failure**: a malformed record or file skips that record/file
//!    and records one diagnostic in [`ParseOutput::warnings`]; only an
//!    unreadable source root returns `Err`
//! 2. **Statelessness**: parsers never touch persisted state; they receive
//!    inputs and return values, the orchestrator commits
//! 3. **Extensible**: new sources only require implementing this trait

use crate::error::{Error, Result};
use crate::types::{ContentItem, Session, Source};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// One place a parser can read records from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// A file or directory on disk
    Path(PathBuf),
    /// A remote feed
    Url(String),
}

impl SourceLocation {
    pub fn display(&self) -> String {
        match self {
            SourceLocation::Path(p) => p.display().to_string(),
            SourceLocation::Url(u) => u.clone(),
        }
    }
}

/// Glob pattern for discovering source files under a parser's root.
#[derive(Debug, Clone)]
pub struct SourcePattern {
    /// Glob relative to the parser root (e.g. `projects/*/*.jsonl`)
    pub pattern: String,
    /// Human-readable description for logging
    pub description: String,
}

/// Everything parsed from one location.
#[derive(Debug, Default)]
pub struct ParseOutput {
    /// Non-session records (articles, posts, visits)
    pub items: Vec<ContentItem>,
    /// Coding sessions
    pub sessions: Vec<Session>,
    /// Non-fatal diagnostics encountered while parsing
    pub warnings: Vec<String>,
}

impl ParseOutput {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.sessions.is_empty()
    }

    pub fn merge(&mut self, other: ParseOutput) {
        self.items.extend(other.items);
        self.sessions.extend(other.sessions);
        self.warnings.extend(other.warnings);
    }
}

/// Context passed to a parser for one location.
pub struct ParseContext<'a> {
    pub location: &'a SourceLocation,
    /// Records earlier than this are outside the lookback window
    pub since: DateTime<Utc>,
    /// Cooperative cancellation; parsers check between records, never mid-record
    pub cancel: &'a AtomicBool,
}

impl ParseContext<'_> {
    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// Trait implemented by all source parsers.
pub trait SourceParser: Send + Sync {
    /// Which source this parser handles
    fn source(&self) -> Source;

    /// Root directory for file-based sources; `None` for network sources.
    fn root_path(&self) -> Option<PathBuf>;

    /// Whether there is anything to read (root exists, or URLs configured).
    fn is_available(&self) -> bool {
        self.root_path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Patterns for discovering source files under [`Self::root_path`].
    ///
    /// Network parsers return an empty set and override [`Self::discover`].
    fn source_patterns(&self) -> Vec<SourcePattern> {
        vec![]
    }

    /// Discover all locations this parser should read.
    ///
    /// The default walks [`Self::source_patterns`] with `glob`, keeping only
    /// files modified within the lookback window.
    fn discover(&self, since: DateTime<Utc>) -> Result<Vec<SourceLocation>> {
        let root = match self.root_path() {
            Some(r) => r,
            None => return Ok(vec![]),
        };

        let mut locations = Vec::new();

        for pattern in self.source_patterns() {
            let full_pattern = root.join(&pattern.pattern);
            let pattern_str = full_pattern.to_string_lossy();

            let entries = glob::glob(&pattern_str).map_err(|e| Error::Parse {
                source_name: self.source().to_string(),
                message: format!("invalid glob pattern: {}", e),
            })?;

            for entry in entries.flatten() {
                if modified_within(&entry, since) {
                    locations.push(SourceLocation::Path(entry));
                }
            }
        }

        locations.sort_by_key(|l| l.display());
        locations.dedup();
        Ok(locations)
    }

    /// Parse a single location into items and sessions.
    ///
    /// ## Error Handling
    ///
    /// Individual record failures must be recorded in
    /// [`ParseOutput::warnings`], not returned as errors. Only an unreadable
    /// location returns `Err`, which the orchestrator treats as fatal for
    /// this source alone.
    fn parse(&self, ctx: &ParseContext) -> Result<ParseOutput>;
}

/// Whether a path (or, for directories, any direct child) was modified at or
/// after the cutoff. Unreadable metadata keeps the location in scope.
fn modified_within(path: &std::path::Path, since: DateTime<Utc>) -> bool {
    fn mtime(path: &std::path::Path) -> Option<DateTime<Utc>> {
        let modified = std::fs::metadata(path).ok()?.modified().ok()?;
        Some(DateTime::from(modified))
    }

    match mtime(path) {
        Some(t) if t >= since => true,
        Some(_) if path.is_dir() => std::fs::read_dir(path)
            .map(|entries| {
                entries
                    .flatten()
                    .any(|e| mtime(&e.path()).map(|t| t >= since).unwrap_or(true))
            })
            .unwrap_or(true),
        Some(_) => false,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        let p = SourceLocation::Path(PathBuf::from("/tmp/a.jsonl"));
        assert_eq!(p.display(), "/tmp/a.jsonl");
        let u = SourceLocation::Url("https://example.com/feed.xml".into());
        assert_eq!(u.display(), "https://example.com/feed.xml");
    }

    #[test]
    fn test_parse_output_merge() {
        let mut a = ParseOutput::default();
        let mut b = ParseOutput::default();
        b.warnings.push("bad line".to_string());
        a.merge(b);
        assert_eq!(a.warnings.len(), 1);
        assert!(a.is_empty());
    }

    #[test]
    fn test_modified_within_accepts_recent_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.jsonl");
        std::fs::write(&file, "{}").unwrap();

        let old_cutoff = Utc::now() - chrono::Duration::days(1);
        assert!(modified_within(&file, old_cutoff));

        let future_cutoff = Utc::now() + chrono::Duration::days(1);
        assert!(!modified_within(&file, future_cutoff));
    }
}
