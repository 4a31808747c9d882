//! Blog state, blog memory, and pending flags
//!
//! Two durable records drive idempotence:
//!
//! - **BlogState** knows what was generated, from which journal dates, and
//!   under which config fingerprint. The skip check compares inputs, the
//!   force path bypasses it but still updates state on completion.
//! - **BlogMemory** is the richer record the blog synthesizer reads to
//!   avoid repeating itself across posts.
//!
//! Pending flags mark dates whose synthesis exhausted its retries;
//! downstream stages skip those dates until a later run clears them.

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::PostType;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================
// Blog state
// ============================================

/// One generated post as the state layer sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogStateEntry {
    pub slug: String,
    pub post_type: PostType,
    /// Theme name for thematic posts
    pub theme: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub source_dates: Vec<NaiveDate>,
    pub file_path: String,
    /// Fingerprint of the synthesis-relevant config at generation time
    pub config_fingerprint: String,
    /// Set when a source journal was force-regenerated after this post
    #[serde(default)]
    pub stale: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlogState {
    pub posts: Vec<BlogStateEntry>,
}

impl BlogState {
    pub fn find(&self, slug: &str) -> Option<&BlogStateEntry> {
        self.posts.iter().find(|p| p.slug == slug)
    }

    pub fn slug_taken(&self, slug: &str) -> bool {
        self.find(slug).is_some()
    }

    /// Whether a thematic post already exists for the given theme.
    pub fn has_thematic_post(&self, theme: &str) -> bool {
        self.find_thematic(theme).is_some()
    }

    /// The recorded thematic post for a theme, if any.
    pub fn find_thematic(&self, theme: &str) -> Option<&BlogStateEntry> {
        self.posts
            .iter()
            .find(|p| p.post_type == PostType::Thematic && p.theme.as_deref() == Some(theme))
    }

    /// Whether the recorded post is current for the given inputs: same
    /// source dates, same config fingerprint, and not flagged stale.
    pub fn is_current(&self, slug: &str, source_dates: &[NaiveDate], fingerprint: &str) -> bool {
        self.find(slug)
            .map(|p| {
                !p.stale && p.config_fingerprint == fingerprint && p.source_dates == source_dates
            })
            .unwrap_or(false)
    }

    /// Insert or replace the entry for a slug.
    pub fn upsert(&mut self, entry: BlogStateEntry) {
        if let Some(existing) = self.posts.iter_mut().find(|p| p.slug == entry.slug) {
            *existing = entry;
        } else {
            self.posts.push(entry);
        }
    }

    /// Flag every post that consumed the given journal date as stale.
    /// Returns how many posts were flagged.
    pub fn mark_stale_for_date(&mut self, date: NaiveDate) -> usize {
        let mut flagged = 0;
        for post in &mut self.posts {
            if !post.stale && post.source_dates.contains(&date) {
                post.stale = true;
                flagged += 1;
            }
        }
        flagged
    }
}

// ============================================
// Blog memory
// ============================================

/// Per-post record feeding the non-repetition check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogMemoryEntry {
    pub slug: String,
    pub date: NaiveDate,
    pub key_points: Vec<String>,
    pub examples_used: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlogMemory {
    pub posts: Vec<BlogMemoryEntry>,
}

impl BlogMemory {
    /// Union of key points and examples from the last `n` posts, newest
    /// first, deduplicated.
    pub fn avoid_list(&self, n: usize) -> Vec<String> {
        let mut seen = BTreeSet::new();
        let mut avoid = Vec::new();
        for post in self.posts.iter().rev().take(n) {
            for value in post.key_points.iter().chain(post.examples_used.iter()) {
                if seen.insert(value.clone()) {
                    avoid.push(value.clone());
                }
            }
        }
        avoid
    }

    pub fn record(&mut self, entry: BlogMemoryEntry) {
        self.posts.retain(|p| p.slug != entry.slug);
        self.posts.push(entry);
    }
}

// ============================================
// Pending flags
// ============================================

/// Stage whose retries were exhausted for a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PendingStage {
    Journal,
    Blog,
}

/// Per-date pending markers. A date with a pending journal is skipped by
/// every downstream stage until a successful rerun clears the flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PendingFlags {
    pub dates: BTreeMap<NaiveDate, BTreeSet<PendingStage>>,
}

impl PendingFlags {
    pub fn set(&mut self, date: NaiveDate, stage: PendingStage) {
        self.dates.entry(date).or_default().insert(stage);
    }

    pub fn clear(&mut self, date: NaiveDate, stage: PendingStage) {
        if let Some(stages) = self.dates.get_mut(&date) {
            stages.remove(&stage);
            if stages.is_empty() {
                self.dates.remove(&date);
            }
        }
    }

    pub fn is_pending(&self, date: NaiveDate, stage: PendingStage) -> bool {
        self.dates
            .get(&date)
            .map(|s| s.contains(&stage))
            .unwrap_or(false)
    }

    pub fn pending_dates(&self) -> Vec<NaiveDate> {
        self.dates.keys().copied().collect()
    }
}

// ============================================
// Store wrappers
// ============================================

impl Store {
    pub fn load_blog_state(&self) -> Result<BlogState> {
        self.load_json(&self.blog_state_path())
    }

    pub fn save_blog_state(&self, state: &BlogState) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(state)?;
        self.atomic_write(&self.blog_state_path(), &bytes)
    }

    pub fn load_blog_memory(&self) -> Result<BlogMemory> {
        self.load_json(&self.blog_memory_path())
    }

    pub fn save_blog_memory(&self, memory: &BlogMemory) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(memory)?;
        self.atomic_write(&self.blog_memory_path(), &bytes)
    }

    pub fn load_pending(&self) -> Result<PendingFlags> {
        self.load_json(&self.pending_path())
    }

    pub fn save_pending(&self, pending: &PendingFlags) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(pending)?;
        self.atomic_write(&self.pending_path(), &bytes)
    }

    fn load_json<T: Default + serde::de::DeserializeOwned>(
        &self,
        path: &std::path::Path,
    ) -> Result<T> {
        if !path.exists() {
            return Ok(T::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| Error::StateCorrupt {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}
