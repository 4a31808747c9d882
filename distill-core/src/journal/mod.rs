//! Journal synthesizer
//!
//! Builds the day's context from analyzed sessions plus rolling memory,
//! renders a prompt, and drives the LLM worker to one coherent narrative.
//! The synthesizer is stateless: cache checks and writes belong to the
//! orchestrator and the store.

mod context;

pub use context::{build_daily_context, DailyContext, SessionSummary};

use crate::config::{JournalConfig, LlmConfig};
use crate::error::Result;
use crate::llm::{invoke_with_retry, LlmWorker};
use crate::types::JournalEntry;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;

/// Fixed prompt scaffold; the rendered context is appended per day.
const JOURNAL_PROMPT: &str = "\
You are writing a developer's daily journal entry in markdown.

Write one coherent narrative of the day's work from the context below.
Start with a single top-level heading. Weave the sessions into prose
rather than listing them. Mention projects by name, fold in active
threads where they connect, and close with anything left open. Do not
invent work that is not in the context.
";

/// Outcome of one journal synthesis.
#[derive(Debug)]
pub struct JournalDraft {
    pub entry: JournalEntry,
    /// Non-fatal conditions worth surfacing in the run report
    pub diagnostics: Vec<String>,
}

/// Drives the LLM worker for one day's journal.
pub struct JournalSynthesizer<'a> {
    worker: &'a dyn LlmWorker,
    journal: &'a JournalConfig,
    llm: &'a LlmConfig,
}

impl<'a> JournalSynthesizer<'a> {
    pub fn new(worker: &'a dyn LlmWorker, journal: &'a JournalConfig, llm: &'a LlmConfig) -> Self {
        Self {
            worker,
            journal,
            llm,
        }
    }

    /// Generate one journal entry from a prepared context.
    ///
    /// Length is enforced to ±50% of the configured target: one corrected
    /// re-prompt, then the result is accepted with a diagnostic.
    pub fn synthesize(&self, ctx: &DailyContext, cancel: &AtomicBool) -> Result<JournalDraft> {
        let mut diagnostics = Vec::new();
        let target = self.journal.target_word_count;

        let prompt = render_prompt(ctx, target);
        let raw = invoke_with_retry(self.worker, &prompt, self.llm.retries, cancel)?;
        let mut body = strip_chrome(&raw);
        let mut words = word_count(&body);

        if !within_band(words, target) {
            tracing::info!(words, target, date = %ctx.date, "Journal length out of band, re-prompting");
            let correction = format!(
                "{}\n\nThe previous draft was {} words; the target is {} words. \
                 Rewrite the entry to roughly the target length, keeping the substance.\n\n\
                 Previous draft:\n{}",
                prompt, words, target, body
            );
            let retry = invoke_with_retry(self.worker, &correction, self.llm.retries, cancel)?;
            body = strip_chrome(&retry);
            words = word_count(&body);

            if !within_band(words, target) {
                diagnostics.push(format!(
                    "journal {} length {} words still outside ±50% of target {}",
                    ctx.date, words, target
                ));
            }
        }

        let mut projects: Vec<String> = ctx
            .sessions
            .iter()
            .map(|s| s.project.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        projects.sort();

        let mut tags: BTreeSet<String> = BTreeSet::new();
        for session in &ctx.sessions {
            tags.extend(session.tags.iter().cloned());
        }

        let mut source_session_ids: Vec<String> =
            ctx.sessions.iter().map(|s| s.id.clone()).collect();
        source_session_ids.sort();

        let duration_minutes = ctx.sessions.iter().map(|s| s.duration_minutes).sum();

        let entry = JournalEntry {
            date: ctx.date,
            style: ctx.style.clone(),
            word_count: words,
            projects,
            sessions_count: ctx.sessions.len(),
            duration_minutes,
            tags,
            source_session_ids,
            generated_at: Utc::now(),
            body_markdown: body,
        };

        Ok(JournalDraft { entry, diagnostics })
    }
}

/// Render the full prompt for a day.
fn render_prompt(ctx: &DailyContext, target_words: usize) -> String {
    let mut prompt = String::from(JOURNAL_PROMPT);
    prompt.push_str(&format!(
        "\nTarget length: about {} words.\nDate: {}\nStyle: {}\n",
        target_words, ctx.date, ctx.style
    ));

    prompt.push_str("\n## Sessions\n");
    for session in &ctx.sessions {
        prompt.push_str(&session.render());
    }

    if !ctx.active_threads.is_empty() {
        prompt.push_str("\n## Ongoing threads\n");
        for thread in &ctx.active_threads {
            prompt.push_str(&format!(
                "- {} (seen {} times, last {})\n",
                thread.name, thread.mention_count, thread.last_seen
            ));
        }
    }

    if !ctx.recent_entities.is_empty() {
        prompt.push_str("\n## Recently mentioned\n");
        for entity in &ctx.recent_entities {
            prompt.push_str(&format!("- {} ({})\n", entity.name, entity.entity_type));
        }
    }

    if !ctx.projects.is_empty() {
        prompt.push_str("\n## Projects\n");
        for project in &ctx.projects {
            prompt.push_str(&format!("- {}: {}\n", project.name, project.description));
        }
    }

    if !ctx.notes.is_empty() {
        prompt.push_str("\n## Editorial guidance\n");
        for note in &ctx.notes {
            prompt.push_str(&format!("- {}\n", note.text));
        }
    }

    if !ctx.seeds.is_empty() {
        prompt.push_str("\n## Idea seeds (work one in if it fits)\n");
        for seed in &ctx.seeds {
            prompt.push_str(&format!("- {}\n", seed.text));
        }
    }

    prompt
}

/// Drop any chrome the worker printed outside the entry itself: everything
/// before the first top-level heading.
fn strip_chrome(text: &str) -> String {
    match text.lines().position(|l| l.starts_with("# ")) {
        Some(index) => text
            .lines()
            .skip(index)
            .collect::<Vec<_>>()
            .join("\n")
            .trim_end()
            .to_string(),
        None => text.trim().to_string(),
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn within_band(words: usize, target: usize) -> bool {
    let lower = target / 2;
    let upper = target + target / 2;
    words >= lower && words <= upper
}
