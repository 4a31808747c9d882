//! Blog context builder
//!
//! Reads journals over a window and rolling memory to assemble the inputs
//! for weekly and thematic posts. Topic detection is exact-string matching
//! against thread names and tags; there is no embedding fallback.

use crate::config::BlogConfig;
use crate::store::BlogState;
use crate::types::{iso_week_label, EntityRecord, JournalEntry, UnifiedMemory};
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Longest journal excerpt carried into a blog prompt.
const EXCERPT_CHARS: usize = 1200;

/// Inputs for one weekly post.
#[derive(Debug, Clone)]
pub struct WeeklyContext {
    /// ISO week label, e.g. `2026-W06`
    pub week: String,
    /// Post date: the last journal date of the week
    pub date: NaiveDate,
    pub journal_dates: Vec<NaiveDate>,
    pub projects: Vec<String>,
    /// Threads mentioned during the week
    pub themes: Vec<String>,
    /// Exact strings appearing in at least two of the week's journals
    pub recurring_topics: Vec<String>,
    pub decisions: Vec<String>,
    pub open_questions: Vec<String>,
    /// One excerpt per journal, oldest first
    pub excerpts: Vec<String>,
}

/// Build the weekly context, or `None` when the week has too few journals.
pub fn build_weekly_context(
    week: &str,
    journals: &[JournalEntry],
    memory: &UnifiedMemory,
    config: &BlogConfig,
) -> Option<WeeklyContext> {
    let mut journals: Vec<&JournalEntry> = journals
        .iter()
        .filter(|j| iso_week_label(j.date) == week)
        .collect();
    journals.sort_by_key(|j| j.date);

    if journals.is_empty() || journals.len() < config.min_journals_for_weekly {
        tracing::info!(
            week,
            count = journals.len(),
            needed = config.min_journals_for_weekly,
            "Too few journals for a weekly post"
        );
        return None;
    }

    let journal_dates: Vec<NaiveDate> = journals.iter().map(|j| j.date).collect();
    let first = *journal_dates.first().expect("non-empty");
    let last = *journal_dates.last().expect("non-empty");

    let projects: Vec<String> = journals
        .iter()
        .flat_map(|j| j.projects.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    // Themes active during the week, from the deterministic daily record.
    let themes: Vec<String> = memory
        .daily_entries
        .iter()
        .filter(|e| e.date >= first && e.date <= last)
        .flat_map(|e| e.themes.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let recurring_topics = recurring_topics(&journals, &themes);

    let decisions: Vec<String> = memory
        .daily_entries
        .iter()
        .filter(|e| e.date >= first && e.date <= last)
        .flat_map(|e| e.decisions.iter().cloned())
        .collect();
    let open_questions: Vec<String> = memory
        .daily_entries
        .iter()
        .filter(|e| e.date >= first && e.date <= last)
        .flat_map(|e| e.open_questions.iter().cloned())
        .collect();

    let excerpts = journals
        .iter()
        .map(|j| excerpt_of(&j.body_markdown))
        .collect();

    Some(WeeklyContext {
        week: week.to_string(),
        date: last,
        journal_dates,
        projects,
        themes,
        recurring_topics,
        decisions,
        open_questions,
        excerpts,
    })
}

/// Candidate strings (theme names and tags) appearing in two or more of the
/// week's journal bodies.
fn recurring_topics(journals: &[&JournalEntry], themes: &[String]) -> Vec<String> {
    let mut candidates: BTreeSet<&str> = themes.iter().map(String::as_str).collect();
    for journal in journals {
        candidates.extend(journal.tags.iter().map(String::as_str));
    }

    let mut recurring = Vec::new();
    for candidate in candidates {
        let hits = journals
            .iter()
            .filter(|j| {
                j.body_markdown.contains(candidate) || j.tags.contains(candidate)
            })
            .count();
        if hits >= 2 {
            recurring.push(candidate.to_string());
        }
    }
    recurring
}

/// Inputs for one thematic post.
#[derive(Debug, Clone)]
pub struct ThematicContext {
    pub theme: String,
    /// Last date the theme was seen; used as the post date
    pub date: NaiveDate,
    pub mention_count: u32,
    /// Whether a thematic post already exists for this theme
    pub has_prior_post: bool,
    /// Journal dates mentioning the theme
    pub journal_dates: Vec<NaiveDate>,
    /// Excerpts from those journals, oldest first
    pub excerpts: Vec<String>,
    /// Entities seen on the theme's mention dates
    pub entities: Vec<EntityRecord>,
}

/// Rank thematic candidates as of `today`.
///
/// A thread is a candidate when it has enough mentions inside some sliding
/// window and was seen recently. A thread whose theme already has a post
/// stays eligible even below the mention threshold (a resurgent topic can
/// earn a follow-up); absence of a prior post ranks it ahead at equal
/// mention counts. Final tie-break is lexicographic.
pub fn thematic_candidates(
    memory: &UnifiedMemory,
    blog_state: &BlogState,
    journals: &[JournalEntry],
    config: &BlogConfig,
    today: NaiveDate,
) -> Vec<ThematicContext> {
    let recency_cutoff = today - chrono::Duration::days(config.theme_recency_days as i64);

    let mut candidates: Vec<ThematicContext> = Vec::new();
    for thread in memory.threads.values() {
        if thread.last_seen < recency_cutoff {
            continue;
        }
        let has_prior_post = blog_state.has_thematic_post(&thread.name);
        let peak = peak_window_mentions(memory, &thread.name, config.theme_window_days);
        if peak < config.theme_mention_threshold && !has_prior_post {
            continue;
        }

        let mention_dates: Vec<NaiveDate> = memory
            .daily_entries
            .iter()
            .filter(|e| e.themes.iter().any(|t| t == &thread.name))
            .map(|e| e.date)
            .collect();

        let mut excerpts = Vec::new();
        let mut journal_dates = Vec::new();
        for journal in journals {
            let mentions_theme = mention_dates.contains(&journal.date)
                || journal.body_markdown.contains(&thread.name);
            if mentions_theme {
                journal_dates.push(journal.date);
                excerpts.push(excerpt_of(&journal.body_markdown));
            }
        }

        let entities: Vec<EntityRecord> = memory
            .entities
            .values()
            .filter(|e| mention_dates.contains(&e.last_seen))
            .cloned()
            .collect();

        candidates.push(ThematicContext {
            theme: thread.name.clone(),
            date: thread.last_seen,
            mention_count: thread.mention_count,
            has_prior_post,
            journal_dates,
            excerpts,
            entities,
        });
    }

    candidates.sort_by(|a, b| {
        b.mention_count
            .cmp(&a.mention_count)
            .then(b.date.cmp(&a.date))
            .then(a.has_prior_post.cmp(&b.has_prior_post))
            .then(a.theme.cmp(&b.theme))
    });
    candidates
}

/// Highest mention count of a theme over any sliding window of the given
/// length, evaluated at each recorded date.
fn peak_window_mentions(memory: &UnifiedMemory, theme: &str, window_days: u32) -> u32 {
    memory
        .daily_entries
        .iter()
        .map(|e| memory.theme_mentions_in_window(theme, e.date, window_days))
        .max()
        .unwrap_or(0)
}

fn excerpt_of(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let mut end = EXCERPT_CHARS;
    while end > 0 && !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryUpdate;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn journal(date: &str, body: &str, tags: &[&str]) -> JournalEntry {
        JournalEntry {
            date: d(date),
            style: "dev-journal".to_string(),
            word_count: body.split_whitespace().count(),
            projects: vec!["alpha".to_string()],
            sessions_count: 1,
            duration_minutes: 30,
            tags: tags.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
            source_session_ids: vec![],
            generated_at: Utc::now(),
            body_markdown: body.to_string(),
        }
    }

    fn memory_with_theme(theme: &str, dates: &[&str]) -> UnifiedMemory {
        let mut memory = UnifiedMemory::default();
        for date in dates {
            let update = MemoryUpdate {
                themes: vec![theme.to_string()],
                ..Default::default()
            };
            memory.record_daily(d(date), &update);
            memory.update_threads(&[theme.to_string()], d(date), 14);
        }
        memory
    }

    #[test]
    fn weekly_skipped_below_minimum() {
        let journals = vec![
            journal("2026-02-02", "# Mon\n\ncaching work", &[]),
            journal("2026-02-03", "# Tue\n\nmore caching", &[]),
        ];
        let memory = UnifiedMemory::default();
        let config = BlogConfig::default(); // min 3

        assert!(build_weekly_context("2026-W06", &journals, &memory, &config).is_none());

        let mut relaxed = BlogConfig::default();
        relaxed.min_journals_for_weekly = 2;
        let ctx = build_weekly_context("2026-W06", &journals, &memory, &relaxed).unwrap();
        assert_eq!(ctx.week, "2026-W06");
        assert_eq!(ctx.journal_dates.len(), 2);
        assert_eq!(ctx.date, d("2026-02-03"));
    }

    #[test]
    fn zero_journal_week_is_skipped() {
        let memory = UnifiedMemory::default();
        let mut config = BlogConfig::default();
        config.min_journals_for_weekly = 0;
        // Even with the floor at zero there is nothing to build from.
        assert!(build_weekly_context("2026-W06", &[], &memory, &config).is_none());
    }

    #[test]
    fn recurring_topics_need_two_journals() {
        let journals = vec![
            journal("2026-02-02", "# Mon\n\nworked on caching today", &["debugging"]),
            journal("2026-02-03", "# Tue\n\ncaching again", &[]),
            journal("2026-02-04", "# Wed\n\nsomething else", &[]),
        ];
        let memory = memory_with_theme("caching", &["2026-02-02", "2026-02-03"]);
        let mut config = BlogConfig::default();
        config.min_journals_for_weekly = 3;

        let ctx = build_weekly_context("2026-W06", &journals, &memory, &config).unwrap();
        assert!(ctx.recurring_topics.contains(&"caching".to_string()));
        assert!(!ctx.recurring_topics.contains(&"debugging".to_string()));
        assert!(ctx.themes.contains(&"caching".to_string()));
    }

    #[test]
    fn thematic_candidate_appears_at_threshold() {
        let memory = memory_with_theme("caching", &["2026-02-02", "2026-02-04", "2026-02-06"]);
        let state = BlogState::default();
        let config = BlogConfig::default(); // K = 3

        let candidates =
            thematic_candidates(&memory, &state, &[], &config, d("2026-02-08"));
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].theme, "caching");
        assert!(!candidates[0].has_prior_post);
    }

    #[test]
    fn below_threshold_dropped_unless_posted_before() {
        let memory = memory_with_theme("caching", &["2026-02-02", "2026-02-04"]);
        let config = BlogConfig::default(); // K = 3, peak is 2

        let state = BlogState::default();
        assert!(thematic_candidates(&memory, &state, &[], &config, d("2026-02-08")).is_empty());

        let mut with_post = BlogState::default();
        with_post.upsert(crate::store::BlogStateEntry {
            slug: "caching".to_string(),
            post_type: crate::types::PostType::Thematic,
            theme: Some("caching".to_string()),
            generated_at: Utc::now(),
            source_dates: vec![d("2026-02-02")],
            file_path: String::new(),
            config_fingerprint: String::new(),
            stale: false,
        });
        let candidates = thematic_candidates(&memory, &with_post, &[], &config, d("2026-02-08"));
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].has_prior_post);
    }

    #[test]
    fn stale_themes_fall_out_of_candidacy() {
        let memory = memory_with_theme("caching", &["2025-10-01", "2025-10-03", "2025-10-05"]);
        let state = BlogState::default();
        let config = BlogConfig::default(); // recency 30 days

        assert!(thematic_candidates(&memory, &state, &[], &config, d("2026-02-08")).is_empty());
    }

    #[test]
    fn ranking_prefers_mentions_then_recency_then_novelty() {
        let mut memory = memory_with_theme("caching", &["2026-02-02", "2026-02-04", "2026-02-06"]);
        for date in ["2026-02-01", "2026-02-03", "2026-02-05", "2026-02-07"] {
            let update = MemoryUpdate {
                themes: vec!["parsing".to_string()],
                ..Default::default()
            };
            memory.record_daily(d(date), &update);
            memory.update_threads(&["parsing".to_string()], d(date), 14);
        }

        let state = BlogState::default();
        let config = BlogConfig::default();
        let candidates = thematic_candidates(&memory, &state, &[], &config, d("2026-02-08"));
        assert_eq!(candidates[0].theme, "parsing");
        assert_eq!(candidates[1].theme, "caching");
    }
}
