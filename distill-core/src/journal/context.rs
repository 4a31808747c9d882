//! Daily context assembly
//!
//! Everything the journal prompt needs for one day, gathered from analyzed
//! sessions, a point-in-time memory snapshot, and the seed/note stores.

use crate::config::ProjectSpec;
use crate::types::{
    iso_week_label, EditorialNote, EntityRecord, MemoryThread, NoteTarget, Seed, Session,
    UnifiedMemory,
};
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Seeds offered per journal; older seeds go first.
const SEEDS_PER_JOURNAL: usize = 3;

/// Compact, prompt-ready view of one session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub project: String,
    pub duration_minutes: i64,
    pub tags: BTreeSet<String>,
    pub tool_usage: Vec<(String, u32)>,
    pub outcomes: Vec<String>,
    pub learnings: Vec<String>,
    /// Top-level agent signals (claims, completions), in order
    pub signals: Vec<String>,
}

impl SessionSummary {
    pub fn render(&self) -> String {
        let mut out = format!(
            "- \"{}\" [{}] — {} min",
            self.title, self.project, self.duration_minutes
        );
        if !self.tool_usage.is_empty() {
            let tools: Vec<String> = self
                .tool_usage
                .iter()
                .map(|(name, count)| format!("{}×{}", name, count))
                .collect();
            out.push_str(&format!(", tools: {}", tools.join(" ")));
        }
        out.push('\n');
        for outcome in &self.outcomes {
            out.push_str(&format!("  - {}\n", outcome));
        }
        for signal in &self.signals {
            out.push_str(&format!("  - signal: {}\n", signal));
        }
        for learning in &self.learnings {
            out.push_str(&format!("  - learned: {}\n", learning));
        }
        out
    }

    fn from_session(session: &Session) -> Self {
        let outcomes = session
            .outcomes
            .iter()
            .map(|o| match o {
                crate::types::OutcomeEvent::FileModified { path, action } => match action {
                    crate::types::FileAction::Created => format!("created {}", path),
                    crate::types::FileAction::Edited => format!("edited {}", path),
                },
                crate::types::OutcomeEvent::CommandRun { command, ok } => {
                    if *ok {
                        format!("ran `{}`", command)
                    } else {
                        format!("ran `{}` (failed)", command)
                    }
                }
                crate::types::OutcomeEvent::SignalEmitted { name } => {
                    format!("emitted {}", name)
                }
            })
            .collect();

        let signals = session
            .agent_signals
            .iter()
            .map(|s| format!("{} {}: {}", s.agent_id, s.signal, s.message))
            .collect();

        SessionSummary {
            id: session.item.id.clone(),
            title: session.item.title.clone(),
            project: session.project().to_string(),
            duration_minutes: session.duration_minutes(),
            tags: session.item.tags.clone(),
            tool_usage: session
                .tool_usage
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            outcomes,
            learnings: session.learnings.clone(),
            signals,
        }
    }
}

/// The full context handed to the journal prompt for one date.
#[derive(Debug, Clone)]
pub struct DailyContext {
    pub date: NaiveDate,
    pub style: String,
    pub sessions: Vec<SessionSummary>,
    pub active_threads: Vec<MemoryThread>,
    pub recent_entities: Vec<EntityRecord>,
    /// Descriptors for every project touched today
    pub projects: Vec<ProjectSpec>,
    pub notes: Vec<EditorialNote>,
    pub seeds: Vec<Seed>,
}

/// Assemble the context for one day.
///
/// The memory snapshot is immutable here: threads active inside the window,
/// entities mentioned yesterday. Editorial notes match when global or
/// targeted at this date's ISO week.
#[allow(clippy::too_many_arguments)]
pub fn build_daily_context(
    date: NaiveDate,
    style: &str,
    sessions: &[Session],
    memory: &UnifiedMemory,
    seeds: &[Seed],
    notes: &[EditorialNote],
    projects: &[ProjectSpec],
    memory_window_days: u32,
) -> DailyContext {
    let cutoff = date - chrono::Duration::days(memory_window_days as i64);
    let active_threads: Vec<MemoryThread> =
        memory.active_threads(cutoff).into_iter().cloned().collect();

    let yesterday = date - chrono::Duration::days(1);
    let recent_entities: Vec<EntityRecord> = memory
        .entities_seen_on(yesterday)
        .into_iter()
        .cloned()
        .collect();

    let week = iso_week_label(date);
    let notes: Vec<EditorialNote> = notes
        .iter()
        .filter(|n| !n.used)
        .filter(|n| match &n.target {
            NoteTarget::Global => true,
            NoteTarget::Week(w) => *w == week,
            NoteTarget::Theme(_) => false,
        })
        .cloned()
        .collect();

    let mut seeds: Vec<Seed> = seeds.iter().filter(|s| !s.used).cloned().collect();
    seeds.sort_by_key(|s| s.created_at);
    seeds.truncate(SEEDS_PER_JOURNAL);

    let summaries: Vec<SessionSummary> = sessions.iter().map(SessionSummary::from_session).collect();

    let touched: BTreeSet<&str> = summaries.iter().map(|s| s.project.as_str()).collect();
    let projects: Vec<ProjectSpec> = projects
        .iter()
        .filter(|p| touched.contains(p.name.as_str()))
        .cloned()
        .collect();

    DailyContext {
        date,
        style: style.to_string(),
        sessions: summaries,
        active_threads,
        recent_entities,
        projects,
        notes,
        seeds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentItem, ContentKind, Source, ThreadStatus};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn session(project: &str) -> Session {
        let now = Utc::now();
        Session {
            item: ContentItem {
                id: "chat-log-1".to_string(),
                source: Source::ChatLog,
                kind: ContentKind::Session,
                title: "work".to_string(),
                body: String::new(),
                excerpt: String::new(),
                url: None,
                author: None,
                site_name: None,
                published_at: None,
                ingested_at: now,
                tags: BTreeSet::new(),
                topics: BTreeSet::new(),
                project: Some(project.to_string()),
                metadata: serde_json::json!({}),
            },
            started_at: now,
            ended_at: now,
            duration_seconds: Some(0),
            tool_usage: BTreeMap::new(),
            outcomes: vec![],
            agent_signals: vec![],
            learnings: vec![],
        }
    }

    fn note(text: &str, target: NoteTarget) -> EditorialNote {
        EditorialNote {
            id: text.to_string(),
            text: text.to_string(),
            target,
            created_at: Utc::now(),
            used: false,
        }
    }

    #[test]
    fn notes_filter_by_week() {
        let memory = UnifiedMemory::default();
        let notes = vec![
            note("global", NoteTarget::Global),
            note("this week", NoteTarget::Week("2026-W06".into())),
            note("other week", NoteTarget::Week("2026-W09".into())),
            note("theme", NoteTarget::Theme("caching".into())),
        ];

        let ctx = build_daily_context(
            d("2026-02-08"),
            "dev-journal",
            &[session("alpha")],
            &memory,
            &[],
            &notes,
            &[],
            7,
        );

        let texts: Vec<&str> = ctx.notes.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["global", "this week"]);
    }

    #[test]
    fn threads_respect_window() {
        let mut memory = UnifiedMemory::default();
        memory.update_threads(&["old".into()], d("2026-01-01"), 14);
        memory.update_threads(&["fresh".into()], d("2026-02-07"), 14);
        // Dormancy was recomputed at the last update; "old" is dormant and
        // outside the window either way.

        let ctx = build_daily_context(
            d("2026-02-08"),
            "dev-journal",
            &[],
            &memory,
            &[],
            &[],
            &[],
            7,
        );
        let names: Vec<&str> = ctx.active_threads.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["fresh"]);
    }

    #[test]
    fn project_descriptors_only_for_touched_projects() {
        let memory = UnifiedMemory::default();
        let projects = vec![
            ProjectSpec {
                name: "alpha".into(),
                description: "the main app".into(),
                url: None,
                tags: vec![],
                roots: vec![],
            },
            ProjectSpec {
                name: "beta".into(),
                description: "another app".into(),
                url: None,
                tags: vec![],
                roots: vec![],
            },
        ];

        let ctx = build_daily_context(
            d("2026-02-08"),
            "dev-journal",
            &[session("alpha")],
            &memory,
            &[],
            &[],
            &projects,
            7,
        );
        assert_eq!(ctx.projects.len(), 1);
        assert_eq!(ctx.projects[0].name, "alpha");
    }

    #[test]
    fn seed_offer_is_capped_and_oldest_first() {
        let memory = UnifiedMemory::default();
        let mut seeds = Vec::new();
        for i in 0..5 {
            seeds.push(Seed {
                id: format!("s{}", i),
                text: format!("idea {}", i),
                tags: vec![],
                created_at: Utc::now() + chrono::Duration::seconds(i),
                used: false,
                used_in: None,
            });
        }
        seeds[0].used = true;

        let ctx = build_daily_context(
            d("2026-02-08"),
            "dev-journal",
            &[],
            &memory,
            &seeds,
            &[],
            &[],
            7,
        );
        let ids: Vec<&str> = ctx.seeds.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2", "s3"]);
    }

    #[test]
    fn thread_status_visible_in_context() {
        let mut memory = UnifiedMemory::default();
        memory.update_threads(&["caching".into()], d("2026-02-07"), 14);
        assert_eq!(memory.threads["caching"].status, ThreadStatus::Active);
    }
}
