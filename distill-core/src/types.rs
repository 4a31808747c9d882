//! Core domain types for distill
//!
//! These types form the canonical data model that normalizes activity from
//! all supported sources — AI coding sessions in three dialects, plus
//! external reading feeds — before synthesis.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **ContentItem** | One canonical ingestion record, regardless of source |
//! | **Session** | A ContentItem specialized for one AI coding session |
//! | **JournalEntry** | LLM-synthesized narrative of one day's sessions |
//! | **BlogPost** | LLM-synthesized weekly or thematic long-form piece |
//! | **MemoryThread** | A recurring topic tracked across days |
//! | **Seed** | A short user-authored idea fed into synthesis context |
//! | **EditorialNote** | User steering instruction targeted at a week or theme |

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================
// Sources
// ============================================

/// Where a content item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    /// Newline-delimited JSON chat logs, one session per file
    ChatLog,
    /// Directory-per-session logs with a manifest plus ordered event files
    Rollout,
    /// Mission/cycle/task state trees from multi-agent runs
    MultiAgent,
    Rss,
    Browser,
    Substack,
    Gmail,
    Linkedin,
    Twitter,
    Reddit,
    Youtube,
    Seed,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::ChatLog => "chat-log",
            Source::Rollout => "rollout",
            Source::MultiAgent => "multi-agent",
            Source::Rss => "rss",
            Source::Browser => "browser",
            Source::Substack => "substack",
            Source::Gmail => "gmail",
            Source::Linkedin => "linkedin",
            Source::Twitter => "twitter",
            Source::Reddit => "reddit",
            Source::Youtube => "youtube",
            Source::Seed => "seed",
        }
    }

    /// Whether this source yields coding sessions (as opposed to read items).
    pub fn is_session_source(&self) -> bool {
        matches!(self, Source::ChatLog | Source::Rollout | Source::MultiAgent)
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat-log" => Ok(Source::ChatLog),
            "rollout" => Ok(Source::Rollout),
            "multi-agent" => Ok(Source::MultiAgent),
            "rss" => Ok(Source::Rss),
            "browser" => Ok(Source::Browser),
            "substack" => Ok(Source::Substack),
            "gmail" => Ok(Source::Gmail),
            "linkedin" => Ok(Source::Linkedin),
            "twitter" => Ok(Source::Twitter),
            "reddit" => Ok(Source::Reddit),
            "youtube" => Ok(Source::Youtube),
            "seed" => Ok(Source::Seed),
            _ => Err(format!("unknown source: {}", s)),
        }
    }
}

/// Broad shape of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Session,
    Article,
    Post,
    Email,
    Video,
    Note,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Session => "session",
            ContentKind::Article => "article",
            ContentKind::Post => "post",
            ContentKind::Email => "email",
            ContentKind::Video => "video",
            ContentKind::Note => "note",
        }
    }
}

// ============================================
// Content items
// ============================================

/// Canonical ingestion record.
///
/// Items are created once by a parser, assigned a stable `id` by the
/// normalizer, and immutable afterward. Re-ingesting the same source data
/// yields the same `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    /// Stable identifier derived from source fields (see `ingest::normalize`)
    pub id: String,
    pub source: Source,
    pub kind: ContentKind,
    pub title: String,
    pub body: String,
    /// Short display excerpt of the body
    pub excerpt: String,
    pub url: Option<String>,
    pub author: Option<String>,
    pub site_name: Option<String>,
    /// When the source says this was published (external content)
    pub published_at: Option<DateTime<Utc>>,
    /// When we first saw it
    pub ingested_at: DateTime<Utc>,
    pub tags: BTreeSet<String>,
    pub topics: BTreeSet<String>,
    /// Attributed project, once the analyzer has run
    pub project: Option<String>,
    /// Source-specific fields we recognized but don't model
    pub metadata: serde_json::Value,
}

/// Metadata key under which parsers stash a source-native identifier for
/// the normalizer's id derivation.
pub const META_NATIVE_ID: &str = "native_id";

impl ContentItem {
    /// Source-native identifier, when the parser recorded one.
    pub fn native_id(&self) -> Option<&str> {
        self.metadata.get(META_NATIVE_ID).and_then(|v| v.as_str())
    }
}

// ============================================
// Sessions
// ============================================

/// What physically happened during a session, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutcomeEvent {
    FileModified { path: String, action: FileAction },
    CommandRun { command: String, ok: bool },
    SignalEmitted { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Created,
    Edited,
}

/// One ordered inter-agent signal from a multi-agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSignal {
    pub ts: DateTime<Utc>,
    pub agent_id: String,
    pub role: String,
    pub signal: String,
    pub message: String,
}

/// A recorded AI coding session: a [`ContentItem`] plus timing, tool usage,
/// and outcome structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub item: ContentItem,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Wall-clock duration; `None` means the log's timestamps were unusable
    /// (the analyzer marks negative spans as unknown rather than clamping)
    pub duration_seconds: Option<i64>,
    /// Tool name → call count
    pub tool_usage: BTreeMap<String, u32>,
    pub outcomes: Vec<OutcomeEvent>,
    pub agent_signals: Vec<AgentSignal>,
    /// Free-text learnings, preserved verbatim from the source
    pub learnings: Vec<String>,
}

impl Session {
    /// Project attributed to this session, defaulting to unassigned.
    pub fn project(&self) -> &str {
        self.item.project.as_deref().unwrap_or(UNASSIGNED_PROJECT)
    }

    /// Duration in whole minutes, zero when unknown.
    pub fn duration_minutes(&self) -> i64 {
        self.duration_seconds.unwrap_or(0) / 60
    }
}

/// Attribution used when no project can be determined.
pub const UNASSIGNED_PROJECT: &str = "(unassigned)";

// ============================================
// Journal entries
// ============================================

/// One synthesized journal narrative, keyed by `(date, style)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub date: NaiveDate,
    pub style: String,
    pub word_count: usize,
    pub projects: Vec<String>,
    pub sessions_count: usize,
    pub duration_minutes: i64,
    pub tags: BTreeSet<String>,
    pub source_session_ids: Vec<String>,
    pub generated_at: DateTime<Utc>,
    #[serde(skip)]
    pub body_markdown: String,
}

// ============================================
// Blog posts
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PostType {
    Weekly,
    Thematic,
    ReadingList,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Weekly => "weekly",
            PostType::Thematic => "thematic",
            PostType::ReadingList => "reading-list",
        }
    }
}

impl std::str::FromStr for PostType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(PostType::Weekly),
            "thematic" => Ok(PostType::Thematic),
            "reading-list" => Ok(PostType::ReadingList),
            _ => Err(format!("unknown post type: {}", s)),
        }
    }
}

/// One synthesized blog post, keyed by slug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogPost {
    pub slug: String,
    pub post_type: PostType,
    pub date: NaiveDate,
    pub title: String,
    pub themes: Vec<String>,
    pub projects: Vec<String>,
    /// Journal dates this post consumed
    pub source_dates: Vec<NaiveDate>,
    /// Short canonical claims made by the post, for cross-post dedup
    pub key_points: Vec<String>,
    /// Short canonical example strings, for cross-post dedup
    pub examples_used: Vec<String>,
    pub platforms_published: BTreeSet<String>,
    #[serde(skip)]
    pub body_markdown: String,
}

// ============================================
// Unified memory
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    Active,
    Dormant,
}

/// A recurring topic tracked across days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryThread {
    pub name: String,
    pub summary: String,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
    pub mention_count: u32,
    pub status: ThreadStatus,
}

/// A named person, tool, or system mentioned across days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub name: String,
    pub entity_type: String,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
    pub mention_count: u32,
    /// Most recent context snippets, newest last, capped
    pub recent_contexts: Vec<String>,
}

/// Number of context snippets retained per entity.
pub const ENTITY_CONTEXT_CAP: usize = 5;

/// Append-only record of a published artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedRecord {
    pub slug: String,
    pub title: String,
    pub post_type: PostType,
    pub date: NaiveDate,
    pub platforms: Vec<String>,
}

/// What one day contributed to memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyEntry {
    pub date: NaiveDate,
    pub session_ids: Vec<String>,
    pub read_ids: Vec<String>,
    pub themes: Vec<String>,
    pub insights: Vec<String>,
    pub decisions: Vec<String>,
    pub open_questions: Vec<String>,
}

/// Durable rolling memory across runs.
///
/// Memory grows monotonically: dormancy is a status flag, not deletion, and
/// the published list is append-only. Days older than a configured horizon
/// may be folded into `compacted` summary strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnifiedMemory {
    pub daily_entries: Vec<DailyEntry>,
    /// Threads keyed by name
    pub threads: BTreeMap<String, MemoryThread>,
    /// Entities keyed by name
    pub entities: BTreeMap<String, EntityRecord>,
    pub published: Vec<PublishedRecord>,
    /// One-line summaries of compacted daily entries, oldest first
    #[serde(default)]
    pub compacted: Vec<String>,
}

// ============================================
// Seeds and editorial notes
// ============================================

/// A short user-supplied idea offered to synthesis until used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seed {
    pub id: String,
    pub text: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub used: bool,
    pub used_in: Option<String>,
}

/// Scope of an editorial note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteTarget {
    /// Applies to every synthesis
    Global,
    /// Applies to one ISO week, e.g. `2026-W06`
    Week(String),
    /// Applies to one theme slug
    Theme(String),
}

impl NoteTarget {
    pub fn parse(s: &str) -> Result<Self, String> {
        if s.is_empty() {
            return Ok(NoteTarget::Global);
        }
        if let Some(week) = s.strip_prefix("week:") {
            return Ok(NoteTarget::Week(week.to_string()));
        }
        if let Some(theme) = s.strip_prefix("theme:") {
            return Ok(NoteTarget::Theme(theme.to_string()));
        }
        Err(format!("unknown note target: {}", s))
    }
}

impl std::fmt::Display for NoteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoteTarget::Global => Ok(()),
            NoteTarget::Week(w) => write!(f, "week:{}", w),
            NoteTarget::Theme(t) => write!(f, "theme:{}", t),
        }
    }
}

impl Serialize for NoteTarget {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for NoteTarget {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        NoteTarget::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A user-authored steering instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorialNote {
    pub id: String,
    pub text: String,
    pub target: NoteTarget,
    pub created_at: DateTime<Utc>,
    pub used: bool,
}

// ============================================
// Helpers
// ============================================

/// ISO week label for a date, e.g. `2026-W06`.
pub fn iso_week_label(date: NaiveDate) -> String {
    use chrono::Datelike;
    let week = date.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}
