//! Unified memory persistence and merge rules
//!
//! Memory gives synthesis continuity across runs: which topics recur, which
//! entities keep showing up, what each day contributed, and what has been
//! published. All merge logic lives on [`UnifiedMemory`] as pure functions;
//! the [`Store`] wrappers only load and commit.
//!
//! Memory is monotone: mention counts never decrease, dormancy is a flag,
//! and the published list is append-only.

use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{
    DailyEntry, EntityRecord, MemoryThread, PublishedRecord, ThreadStatus, UnifiedMemory,
    ENTITY_CONTEXT_CAP,
};
use chrono::NaiveDate;

/// One day's deterministic contribution to memory, assembled by the
/// orchestrator from analyzer output (never from LLM prose).
#[derive(Debug, Clone, Default)]
pub struct MemoryUpdate {
    pub session_ids: Vec<String>,
    pub read_ids: Vec<String>,
    pub themes: Vec<String>,
    pub insights: Vec<String>,
    pub decisions: Vec<String>,
    pub open_questions: Vec<String>,
    /// (name, entity type, context snippet)
    pub entities: Vec<(String, String, String)>,
}

impl UnifiedMemory {
    /// Merge a day's contribution into the daily entry for that date.
    pub fn record_daily(&mut self, date: NaiveDate, update: &MemoryUpdate) {
        let entry = match self.daily_entries.iter_mut().find(|e| e.date == date) {
            Some(entry) => entry,
            None => {
                self.daily_entries.push(DailyEntry {
                    date,
                    session_ids: vec![],
                    read_ids: vec![],
                    themes: vec![],
                    insights: vec![],
                    decisions: vec![],
                    open_questions: vec![],
                });
                self.daily_entries.sort_by_key(|e| e.date);
                self.daily_entries
                    .iter_mut()
                    .find(|e| e.date == date)
                    .expect("entry just inserted")
            }
        };

        merge_unique(&mut entry.session_ids, &update.session_ids);
        merge_unique(&mut entry.read_ids, &update.read_ids);
        merge_unique(&mut entry.themes, &update.themes);
        merge_unique(&mut entry.insights, &update.insights);
        merge_unique(&mut entry.decisions, &update.decisions);
        merge_unique(&mut entry.open_questions, &update.open_questions);
    }

    /// Fold the day's themes into threads. A theme seen for the first time
    /// becomes a new active thread; a known theme bumps `last_seen` and
    /// `mention_count`. Every thread's dormancy is then re-evaluated against
    /// `date`.
    pub fn update_threads(&mut self, themes: &[String], date: NaiveDate, dormant_after_days: u32) {
        for theme in themes {
            match self.threads.get_mut(theme) {
                Some(thread) => {
                    if date > thread.last_seen {
                        thread.last_seen = date;
                    }
                    thread.mention_count += 1;
                }
                None => {
                    self.threads.insert(
                        theme.clone(),
                        MemoryThread {
                            name: theme.clone(),
                            summary: String::new(),
                            first_seen: date,
                            last_seen: date,
                            mention_count: 1,
                            status: ThreadStatus::Active,
                        },
                    );
                }
            }
        }

        let horizon = date - chrono::Duration::days(dormant_after_days as i64);
        for thread in self.threads.values_mut() {
            thread.status = if thread.last_seen < horizon {
                ThreadStatus::Dormant
            } else {
                ThreadStatus::Active
            };
        }
    }

    /// Fold extracted entities into the entity table.
    pub fn update_entities(&mut self, extracted: &[(String, String, String)], date: NaiveDate) {
        for (name, entity_type, context) in extracted {
            match self.entities.get_mut(name) {
                Some(record) => {
                    if date > record.last_seen {
                        record.last_seen = date;
                    }
                    record.mention_count += 1;
                    push_context(&mut record.recent_contexts, context);
                }
                None => {
                    self.entities.insert(
                        name.clone(),
                        EntityRecord {
                            name: name.clone(),
                            entity_type: entity_type.clone(),
                            first_seen: date,
                            last_seen: date,
                            mention_count: 1,
                            recent_contexts: vec![context.clone()],
                        },
                    );
                }
            }
        }
    }

    /// Append a published artifact. Append-only by design.
    pub fn record_published(&mut self, record: PublishedRecord) {
        self.published.push(record);
    }

    /// Threads whose last mention is on or after the cutoff and not dormant.
    pub fn active_threads(&self, cutoff: NaiveDate) -> Vec<&MemoryThread> {
        let mut threads: Vec<&MemoryThread> = self
            .threads
            .values()
            .filter(|t| t.status == ThreadStatus::Active && t.last_seen >= cutoff)
            .collect();
        threads.sort_by(|a, b| {
            b.mention_count
                .cmp(&a.mention_count)
                .then(a.name.cmp(&b.name))
        });
        threads
    }

    /// Entities last seen exactly on the given date.
    pub fn entities_seen_on(&self, date: NaiveDate) -> Vec<&EntityRecord> {
        self.entities
            .values()
            .filter(|e| e.last_seen == date)
            .collect()
    }

    /// Number of dates in `daily_entries` on which a theme occurred within
    /// the window `[end - days + 1, end]`.
    pub fn theme_mentions_in_window(&self, theme: &str, end: NaiveDate, days: u32) -> u32 {
        let start = end - chrono::Duration::days(days as i64 - 1);
        self.daily_entries
            .iter()
            .filter(|e| e.date >= start && e.date <= end)
            .filter(|e| e.themes.iter().any(|t| t == theme))
            .count() as u32
    }

    /// Fold daily entries older than the horizon into one-line summaries.
    pub fn compact_older_than(&mut self, horizon: NaiveDate) -> usize {
        let (old, keep): (Vec<DailyEntry>, Vec<DailyEntry>) = self
            .daily_entries
            .drain(..)
            .partition(|e| e.date < horizon);
        self.daily_entries = keep;

        for entry in &old {
            self.compacted.push(format!(
                "{}: {} sessions, {} reads, themes: {}",
                entry.date,
                entry.session_ids.len(),
                entry.read_ids.len(),
                entry.themes.join(", ")
            ));
        }
        old.len()
    }
}

fn merge_unique(target: &mut Vec<String>, additions: &[String]) {
    for value in additions {
        if !target.contains(value) {
            target.push(value.clone());
        }
    }
}

fn push_context(contexts: &mut Vec<String>, context: &str) {
    if contexts.last().map(String::as_str) == Some(context) {
        return;
    }
    contexts.push(context.to_string());
    if contexts.len() > ENTITY_CONTEXT_CAP {
        let excess = contexts.len() - ENTITY_CONTEXT_CAP;
        contexts.drain(..excess);
    }
}

impl Store {
    /// Load unified memory, returning an empty value when none is persisted.
    pub fn load_memory(&self) -> Result<UnifiedMemory> {
        let path = self.memory_path();
        if !path.exists() {
            return Ok(UnifiedMemory::default());
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| Error::StateCorrupt {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Atomically replace the persisted memory; never partial.
    pub fn commit_memory(&self, memory: &UnifiedMemory) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(memory)?;
        self.atomic_write(&self.memory_path(), &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostType;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn record_daily_merges() {
        let mut memory = UnifiedMemory::default();
        let update = MemoryUpdate {
            session_ids: vec!["s1".into()],
            themes: vec!["caching".into()],
            ..Default::default()
        };
        memory.record_daily(d("2026-02-08"), &update);
        memory.record_daily(d("2026-02-08"), &update);

        assert_eq!(memory.daily_entries.len(), 1);
        assert_eq!(memory.daily_entries[0].session_ids, vec!["s1"]);
        assert_eq!(memory.daily_entries[0].themes, vec!["caching"]);
    }

    #[test]
    fn threads_bump_and_go_dormant() {
        let mut memory = UnifiedMemory::default();
        memory.update_threads(&["caching".into()], d("2026-01-01"), 14);
        memory.update_threads(&["caching".into()], d("2026-01-05"), 14);

        let thread = &memory.threads["caching"];
        assert_eq!(thread.mention_count, 2);
        assert_eq!(thread.first_seen, d("2026-01-01"));
        assert_eq!(thread.last_seen, d("2026-01-05"));
        assert_eq!(thread.status, ThreadStatus::Active);

        // A much later day with other themes pushes it dormant
        memory.update_threads(&["parsing".into()], d("2026-02-08"), 14);
        assert_eq!(memory.threads["caching"].status, ThreadStatus::Dormant);
        assert_eq!(memory.threads["parsing"].status, ThreadStatus::Active);
    }

    #[test]
    fn mention_counts_are_monotone() {
        let mut memory = UnifiedMemory::default();
        memory.update_threads(&["caching".into()], d("2026-01-05"), 14);
        let before = memory.threads["caching"].mention_count;
        // Replaying an earlier date still only increases the count
        memory.update_threads(&["caching".into()], d("2026-01-01"), 14);
        assert!(memory.threads["caching"].mention_count > before);
        assert_eq!(memory.threads["caching"].last_seen, d("2026-01-05"));
    }

    #[test]
    fn entity_contexts_are_capped() {
        let mut memory = UnifiedMemory::default();
        for i in 0..10 {
            memory.update_entities(
                &[("rustc".into(), "tool".into(), format!("context {}", i))],
                d("2026-02-08"),
            );
        }
        let record = &memory.entities["rustc"];
        assert_eq!(record.mention_count, 10);
        assert_eq!(record.recent_contexts.len(), ENTITY_CONTEXT_CAP);
        assert_eq!(record.recent_contexts.last().unwrap(), "context 9");
    }

    #[test]
    fn theme_mentions_in_window_counts_dates() {
        let mut memory = UnifiedMemory::default();
        let update = MemoryUpdate {
            themes: vec!["caching".into()],
            ..Default::default()
        };
        memory.record_daily(d("2026-02-01"), &update);
        memory.record_daily(d("2026-02-05"), &update);
        memory.record_daily(d("2026-02-08"), &update);

        assert_eq!(memory.theme_mentions_in_window("caching", d("2026-02-08"), 14), 3);
        assert_eq!(memory.theme_mentions_in_window("caching", d("2026-02-08"), 4), 2);
        assert_eq!(memory.theme_mentions_in_window("parsing", d("2026-02-08"), 14), 0);
    }

    #[test]
    fn compaction_replaces_old_entries() {
        let mut memory = UnifiedMemory::default();
        let update = MemoryUpdate {
            session_ids: vec!["s1".into()],
            themes: vec!["caching".into()],
            ..Default::default()
        };
        memory.record_daily(d("2025-10-01"), &update);
        memory.record_daily(d("2026-02-08"), &update);

        let compacted = memory.compact_older_than(d("2026-01-01"));
        assert_eq!(compacted, 1);
        assert_eq!(memory.daily_entries.len(), 1);
        assert_eq!(memory.compacted.len(), 1);
        assert!(memory.compacted[0].starts_with("2025-10-01"));
    }

    #[test]
    fn store_roundtrip_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        assert!(store.load_memory().unwrap().threads.is_empty());

        let mut memory = UnifiedMemory::default();
        memory.update_threads(&["caching".into()], d("2026-02-08"), 14);
        memory.record_published(PublishedRecord {
            slug: "weekly-2026-W06".into(),
            title: "Week six".into(),
            post_type: PostType::Weekly,
            date: d("2026-02-08"),
            platforms: vec!["markdown".into()],
        });
        store.commit_memory(&memory).unwrap();

        let loaded = store.load_memory().unwrap();
        assert_eq!(loaded.threads.len(), 1);
        assert_eq!(loaded.published.len(), 1);

        // commit(load()) leaves bytes identical
        store.commit_memory(&loaded).unwrap();
        let reloaded = store.load_memory().unwrap();
        assert_eq!(
            serde_json::to_string(&loaded).unwrap(),
            serde_json::to_string(&reloaded).unwrap()
        );
    }
}
