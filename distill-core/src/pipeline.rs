//! Pipeline orchestrator
//!
//! Runs the stages in topological order for a requested date range:
//! ingest → normalize → analyze → intake digest → journals → blog → publish.
//! The state layer short-circuits work that is already complete, pending
//! flags gate downstream stages per date, and every durable write goes
//! through the store.
//!
//! ## Ordering
//!
//! - Journal synthesis is parallel across dates (bounded by the LLM worker
//!   pool) but at most one journal is in flight per date, and every
//!   synthesizer reads an immutable memory snapshot taken at stage start.
//! - Memory updates are applied serially, in date order, from analyzer
//!   output only, after the day's narrative is in hand.
//! - Blog synthesis for a window starts only once no journal date in that
//!   window is pending.

use crate::analyze::analyze_session;
use crate::blog::{build_weekly_context, thematic_candidates, BlogSynthesizer};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ingest::parsers::create_parsers;
use crate::ingest::{normalize, IngestRunner, NormalizedBatch};
use crate::journal::{build_daily_context, DailyContext, JournalSynthesizer};
use crate::llm::{CommandWorker, LlmWorker};
use crate::publish::{create_publishers, fan_out, Publisher};
use crate::store::{
    BlogMemoryEntry, BlogStateEntry, MemoryUpdate, PendingStage, Store,
};
use crate::types::{
    iso_week_label, ContentItem, NoteTarget, PublishedRecord, Session, UnifiedMemory,
};
use chrono::{NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::AtomicBool;

/// Per-run options layered on top of the configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// First date to process; defaults to `until - sessions.since_days`
    pub since: Option<NaiveDate>,
    /// Last date to process; defaults to today in the configured timezone
    pub until: Option<NaiveDate>,
    /// Regenerate even when state says the artifact is current
    pub force_regenerate: bool,
    /// Stop after journals (no blog, no publish)
    pub journals_only: bool,
    /// Skip journal generation (blog/publish from existing journals)
    pub blog_only: bool,
}

/// Structured end-of-run summary.
#[derive(Debug, Default)]
pub struct RunReport {
    pub ingested_by_source: BTreeMap<String, usize>,
    pub duplicates: usize,
    pub failed_sources: Vec<(String, String)>,
    pub journals_generated: Vec<NaiveDate>,
    pub journals_skipped: Vec<NaiveDate>,
    pub posts_generated: Vec<String>,
    pub posts_skipped: Vec<String>,
    /// platform → (succeeded, failed)
    pub deliveries: BTreeMap<String, (usize, usize)>,
    /// Dates still requiring attention
    pub pending_dates: Vec<NaiveDate>,
    pub diagnostics: Vec<String>,
}

impl RunReport {
    /// Render the summary the CLI prints.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("Ingested:\n");
        if self.ingested_by_source.is_empty() {
            out.push_str("  (nothing)\n");
        }
        for (source, count) in &self.ingested_by_source {
            out.push_str(&format!("  {:<12} {}\n", source, count));
        }
        if self.duplicates > 0 {
            out.push_str(&format!("  duplicates dropped: {}\n", self.duplicates));
        }
        for (source, error) in &self.failed_sources {
            out.push_str(&format!("  {} FAILED: {}\n", source, error));
        }

        out.push_str(&format!(
            "Journals: {} generated, {} skipped\n",
            self.journals_generated.len(),
            self.journals_skipped.len()
        ));
        out.push_str(&format!(
            "Blog posts: {} generated, {} skipped\n",
            self.posts_generated.len(),
            self.posts_skipped.len()
        ));
        for slug in &self.posts_generated {
            out.push_str(&format!("  + {}\n", slug));
        }

        if !self.deliveries.is_empty() {
            out.push_str("Deliveries:\n");
            for (platform, (ok, failed)) in &self.deliveries {
                out.push_str(&format!("  {:<12} {} ok, {} failed\n", platform, ok, failed));
            }
        }

        if !self.pending_dates.is_empty() {
            let dates: Vec<String> = self.pending_dates.iter().map(|d| d.to_string()).collect();
            out.push_str(&format!("Pending dates: {}\n", dates.join(", ")));
        }
        for diagnostic in &self.diagnostics {
            out.push_str(&format!("note: {}\n", diagnostic));
        }
        out
    }
}

/// The top-level coordinator.
pub struct Pipeline {
    config: Config,
    store: Store,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self> {
        let store = Store::open(&config.output.directory)?;
        Ok(Self { config, store })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run with the configured subprocess worker.
    pub fn run(&self, opts: &RunOptions, cancel: &AtomicBool) -> Result<RunReport> {
        let worker = CommandWorker::new(&self.config.llm);
        self.run_with_worker(&worker, opts, cancel)
    }

    /// Run with an injected worker (tests, alternative backends).
    pub fn run_with_worker(
        &self,
        worker: &dyn LlmWorker,
        opts: &RunOptions,
        cancel: &AtomicBool,
    ) -> Result<RunReport> {
        let mut report = RunReport::default();

        // Crash recovery first: a result without a state update is an orphan.
        self.store.sweep_scratch()?;

        let (since, until) = self.date_range(opts);
        tracing::info!(%since, %until, force = opts.force_regenerate, "Pipeline run starting");

        let batch = if opts.blog_only {
            NormalizedBatch::default()
        } else {
            self.ingest(since, cancel, &mut report)?
        };

        if !opts.blog_only {
            self.write_intake(&batch, &mut report)?;
            self.run_journals(worker, &batch, since, until, opts, cancel, &mut report)?;
        }

        if !opts.journals_only {
            self.run_blog(worker, since, until, opts, cancel, &mut report)?;
        }

        let pending = self.store.load_pending()?;
        report.pending_dates = pending.pending_dates();

        tracing::info!(
            journals = report.journals_generated.len(),
            posts = report.posts_generated.len(),
            pending = report.pending_dates.len(),
            "Pipeline run finished"
        );
        Ok(report)
    }

    fn date_range(&self, opts: &RunOptions) -> (NaiveDate, NaiveDate) {
        let today = crate::ingest::normalize::bucket_date(
            None,
            None,
            Utc::now(),
            self.config.intake.timezone_offset_minutes,
        );
        let until = opts.until.unwrap_or(today);
        let since = opts
            .since
            .unwrap_or(until - chrono::Duration::days(self.config.sessions.since_days as i64));
        (since, until)
    }

    // ============================================
    // Ingest
    // ============================================

    fn ingest(
        &self,
        since: NaiveDate,
        cancel: &AtomicBool,
        report: &mut RunReport,
    ) -> Result<NormalizedBatch> {
        let runner = IngestRunner::new(
            create_parsers(&self.config),
            self.config.pipeline.parser_workers,
        );
        let since_instant = since
            .and_hms_opt(0, 0, 0)
            .expect("midnight exists")
            .and_utc()
            - chrono::Duration::minutes(self.config.intake.timezone_offset_minutes as i64);

        let output = runner.run(since_instant, cancel)?;
        report.ingested_by_source = output.report.counts_by_source.clone();
        report.failed_sources = output.report.failed_sources.clone();
        report.diagnostics.extend(output.report.warnings.clone());

        let mut batch = normalize(
            output.items,
            output.sessions,
            self.config.intake.timezone_offset_minutes,
        );
        report.duplicates = batch.duplicates;

        for sessions in batch.sessions_by_date.values_mut() {
            for session in sessions.iter_mut() {
                analyze_session(session, &self.config.projects);
            }
        }

        Ok(batch)
    }

    // ============================================
    // Intake digest and archive
    // ============================================

    fn write_intake(&self, batch: &NormalizedBatch, report: &mut RunReport) -> Result<()> {
        for (date, items) in &batch.items_by_date {
            let added = self.store.append_archive(*date, items)?;
            if added > 0 {
                let digest = render_digest(*date, items);
                self.store.write_digest(*date, &digest)?;
            } else {
                report
                    .diagnostics
                    .push(format!("intake {}: all items already archived", date));
            }
        }
        Ok(())
    }

    // ============================================
    // Journals
    // ============================================

    #[allow(clippy::too_many_arguments)]
    fn run_journals(
        &self,
        worker: &dyn LlmWorker,
        batch: &NormalizedBatch,
        since: NaiveDate,
        until: NaiveDate,
        opts: &RunOptions,
        cancel: &AtomicBool,
        report: &mut RunReport,
    ) -> Result<()> {
        let style = self.config.journal.style.clone();
        let mut memory = self.store.load_memory()?;
        let mut pending = self.store.load_pending()?;
        let mut blog_state = self.store.load_blog_state()?;
        let seeds = self.store.unused_seeds()?;
        let notes = self.store.load_notes()?;

        // Decide per date what needs generating.
        let mut to_generate: Vec<(NaiveDate, Vec<Session>, bool)> = Vec::new();
        for (date, sessions) in &batch.sessions_by_date {
            if *date < since || *date > until {
                continue;
            }
            let session_ids: Vec<String> = {
                let mut ids: Vec<String> = sessions.iter().map(|s| s.item.id.clone()).collect();
                ids.sort();
                ids
            };

            let existing = self.store.read_journal(*date, &style)?;
            let replaces_existing = existing.is_some();
            if let Some(existing) = existing {
                let unchanged = existing.source_session_ids == session_ids;
                if unchanged && !opts.force_regenerate {
                    tracing::debug!(date = %date, "Journal up to date, skipping");
                    report.journals_skipped.push(*date);
                    continue;
                }
            }
            to_generate.push((*date, sessions.clone(), replaces_existing));
        }

        // Dates carrying only read items still feed memory. Commit only if
        // the merge changed anything, so re-runs stay write-free.
        let before_reads = serde_json::to_string(&memory)?;
        for (date, items) in &batch.items_by_date {
            if *date < since || *date > until {
                continue;
            }
            if batch.sessions_by_date.contains_key(date) {
                continue;
            }
            let update = MemoryUpdate {
                read_ids: items.iter().map(|i| i.id.clone()).collect(),
                ..Default::default()
            };
            memory.record_daily(*date, &update);
        }
        if serde_json::to_string(&memory)? != before_reads {
            self.store.commit_memory(&memory)?;
        }

        // Synthesize in parallel from an immutable snapshot.
        let snapshot = memory.clone();
        let contexts: Vec<(NaiveDate, DailyContext, Vec<Session>, bool)> = to_generate
            .into_iter()
            .map(|(date, sessions, replaces)| {
                let ctx = build_daily_context(
                    date,
                    &style,
                    &sessions,
                    &snapshot,
                    &seeds,
                    &notes,
                    &self.config.projects,
                    self.config.journal.memory_window_days,
                );
                (date, ctx, sessions, replaces)
            })
            .collect();

        let synthesizer = JournalSynthesizer::new(worker, &self.config.journal, &self.config.llm);
        let results = self.synthesize_parallel(&synthesizer, &contexts, cancel);

        // Apply results serially, in date order.
        for ((date, ctx, sessions, replaces_existing), result) in
            contexts.iter().zip(results.into_iter())
        {
            match result {
                Ok(draft) => {
                    report.diagnostics.extend(draft.diagnostics);

                    // Stage under scratch, then commit: journal file, pending
                    // flag, staleness, memory.
                    let journal_name =
                        format!("journal-{}-{}", date, style);
                    self.store.write_journal(&draft.entry)?;

                    pending.clear(*date, PendingStage::Journal);
                    self.store.save_pending(&pending)?;

                    if *replaces_existing {
                        let flagged = blog_state.mark_stale_for_date(*date);
                        if flagged > 0 {
                            self.store.save_blog_state(&blog_state)?;
                            tracing::info!(date = %date, flagged, "Flagged downstream posts stale");
                        }
                    }

                    for seed in &ctx.seeds {
                        if let Err(e) = self.store.mark_seed_used(&seed.id, &journal_name) {
                            tracing::warn!(seed = %seed.id, error = %e, "Could not mark seed used");
                        }
                    }

                    let mut update = memory_update_for(sessions);
                    if let Some(items) = batch.items_by_date.get(date) {
                        update.read_ids = items.iter().map(|i| i.id.clone()).collect();
                    }
                    memory.record_daily(*date, &update);
                    memory.update_threads(
                        &update.themes,
                        *date,
                        self.config.memory.dormant_after_days,
                    );
                    memory.update_entities(&update.entities, *date);
                    self.store.commit_memory(&memory)?;

                    report.journals_generated.push(*date);
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(date = %date, error = %e, "Journal synthesis failed; flagging pending");
                    pending.set(*date, PendingStage::Journal);
                    self.store.save_pending(&pending)?;
                    report
                        .diagnostics
                        .push(format!("journal {} pending: {}", date, e));
                }
                Err(e) => return Err(e),
            }
        }

        // Horizon compaction is part of routine maintenance.
        let horizon =
            until - chrono::Duration::days(self.config.memory.compact_horizon_days as i64);
        if memory.compact_older_than(horizon) > 0 {
            self.store.commit_memory(&memory)?;
        }

        Ok(())
    }

    /// Run journal synthesis on the bounded LLM pool. One journal in flight
    /// per date; order of results matches the input.
    fn synthesize_parallel(
        &self,
        synthesizer: &JournalSynthesizer,
        contexts: &[(NaiveDate, DailyContext, Vec<Session>, bool)],
        cancel: &AtomicBool,
    ) -> Vec<Result<crate::journal::JournalDraft>> {
        let workers = self.config.llm.workers.max(1).min(contexts.len().max(1));
        if contexts.len() <= 1 || workers == 1 {
            return contexts
                .iter()
                .map(|(_, ctx, _, _)| synthesizer.synthesize(ctx, cancel))
                .collect();
        }

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<usize>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, Result<_>)>();
        for index in 0..contexts.len() {
            job_tx.send(index).expect("job channel open");
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    while let Ok(index) = job_rx.recv() {
                        let result = synthesizer.synthesize(&contexts[index].1, cancel);
                        if result_tx.send((index, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            let mut results: Vec<Option<Result<_>>> =
                (0..contexts.len()).map(|_| None).collect();
            for (index, result) in result_rx.iter() {
                results[index] = Some(result);
            }
            results
                .into_iter()
                .map(|r| {
                    r.unwrap_or_else(|| Err(Error::LlmUnavailable("cancelled".to_string())))
                })
                .collect()
        })
    }

    // ============================================
    // Blog
    // ============================================

    fn run_blog(
        &self,
        worker: &dyn LlmWorker,
        since: NaiveDate,
        until: NaiveDate,
        opts: &RunOptions,
        cancel: &AtomicBool,
        report: &mut RunReport,
    ) -> Result<()> {
        let mut memory = self.store.load_memory()?;
        let mut pending = self.store.load_pending()?;
        let mut blog_state = self.store.load_blog_state()?;
        let mut blog_memory = self.store.load_blog_memory()?;
        let journals = self.store.list_journals()?;
        let fingerprint = self.config.synthesis_fingerprint();

        let publishers = create_publishers(&self.config)?;
        let synthesizer = BlogSynthesizer::new(worker, &self.config.blog, &self.config.llm);

        // Weekly posts for every ISO week intersecting the range.
        let mut weeks: Vec<String> = Vec::new();
        let mut cursor = since;
        while cursor <= until {
            let week = iso_week_label(cursor);
            if !weeks.contains(&week) {
                weeks.push(week);
            }
            cursor += chrono::Duration::days(1);
        }

        for week in &weeks {
            if cancel.load(std::sync::atomic::Ordering::Relaxed) {
                break;
            }
            // A pending journal anywhere in the window blocks the weekly.
            let week_journals = self.store.journals_in_week(week)?;
            let blocked = pending
                .pending_dates()
                .iter()
                .any(|d| iso_week_label(*d) == *week);
            if blocked {
                tracing::info!(week = %week, "Week has pending journals; weekly post deferred");
                report.posts_skipped.push(format!("weekly-{}", week));
                continue;
            }

            let Some(ctx) =
                build_weekly_context(week, &week_journals, &memory, &self.config.blog)
            else {
                continue;
            };

            let slug = format!("weekly-{}", ctx.week);
            if !opts.force_regenerate
                && blog_state.is_current(&slug, &ctx.journal_dates, &fingerprint)
            {
                report.posts_skipped.push(slug);
                continue;
            }

            let week_notes = self.store.notes_matching(|t| match t {
                NoteTarget::Global => true,
                NoteTarget::Week(w) => w == week,
                NoteTarget::Theme(_) => false,
            })?;

            match synthesizer.synthesize_weekly(&ctx, &blog_memory, &week_notes, cancel) {
                Ok(draft) => {
                    report.diagnostics.extend(draft.diagnostics);
                    self.commit_post(
                        draft.post,
                        None,
                        &publishers,
                        &mut blog_state,
                        &mut blog_memory,
                        &mut memory,
                        &fingerprint,
                        cancel,
                        report,
                    )?;
                    pending.clear(ctx.date, PendingStage::Blog);
                    self.store.save_pending(&pending)?;

                    for note in &week_notes {
                        if matches!(note.target, NoteTarget::Week(_)) {
                            if let Err(e) = self.store.mark_note_used(&note.id) {
                                tracing::warn!(note = %note.id, error = %e, "Could not mark note used");
                            }
                        }
                    }
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(week = %week, error = %e, "Weekly synthesis failed; flagging pending");
                    pending.set(ctx.date, PendingStage::Blog);
                    self.store.save_pending(&pending)?;
                    report
                        .diagnostics
                        .push(format!("weekly {} pending: {}", week, e));
                }
                Err(e) => return Err(e),
            }
        }

        // Top-ranked thematic candidate, at most one per run.
        let candidates =
            thematic_candidates(&memory, &blog_state, &journals, &self.config.blog, until);
        if let Some(ctx) = candidates.into_iter().next() {
            // Skip check: an existing post for this theme that consumed the
            // same journal dates under the same config is current.
            let existing_slug = blog_state.find_thematic(&ctx.theme).map(|e| e.slug.clone());
            let current = existing_slug
                .as_deref()
                .map(|slug| {
                    !opts.force_regenerate
                        && blog_state.is_current(slug, &ctx.journal_dates, &fingerprint)
                })
                .unwrap_or(false);
            if current {
                report
                    .posts_skipped
                    .push(existing_slug.expect("checked above"));
            } else if !cancel.load(std::sync::atomic::Ordering::Relaxed) {
                let theme_notes = self.store.notes_matching(|t| match t {
                    NoteTarget::Global => true,
                    NoteTarget::Theme(theme) => {
                        *theme == ctx.theme || *theme == slug::slugify(&ctx.theme)
                    }
                    NoteTarget::Week(_) => false,
                })?;

                // Re-generating the same theme reuses its slug; only a slug
                // owned by a different post forces a numeric suffix.
                let taken = |candidate: &str| {
                    blog_state.slug_taken(candidate) && existing_slug.as_deref() != Some(candidate)
                };
                match synthesizer.synthesize_thematic(
                    &ctx,
                    &blog_memory,
                    &theme_notes,
                    &taken,
                    cancel,
                ) {
                    Ok(draft) => {
                        report.diagnostics.extend(draft.diagnostics);
                        self.commit_post(
                            draft.post,
                            Some(ctx.theme.clone()),
                            &publishers,
                            &mut blog_state,
                            &mut blog_memory,
                            &mut memory,
                            &fingerprint,
                            cancel,
                            report,
                        )?;

                        for note in &theme_notes {
                            if matches!(note.target, NoteTarget::Theme(_)) {
                                if let Err(e) = self.store.mark_note_used(&note.id) {
                                    tracing::warn!(note = %note.id, error = %e, "Could not mark note used");
                                }
                            }
                        }
                    }
                    Err(e) if e.is_retryable() => {
                        tracing::warn!(theme = %ctx.theme, error = %e, "Thematic synthesis failed");
                        report
                            .diagnostics
                            .push(format!("thematic {} failed: {}", ctx.theme, e));
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(())
    }

    /// Commit one post: scratch result, fan-out, canonical move, then state.
    #[allow(clippy::too_many_arguments)]
    fn commit_post(
        &self,
        mut post: crate::types::BlogPost,
        theme: Option<String>,
        publishers: &[Box<dyn Publisher>],
        blog_state: &mut crate::store::BlogState,
        blog_memory: &mut crate::store::BlogMemory,
        memory: &mut UnifiedMemory,
        fingerprint: &str,
        cancel: &AtomicBool,
        report: &mut RunReport,
    ) -> Result<()> {
        // The result lands in scratch first and is moved into place before
        // any state record claims the post. A crash anywhere in between
        // leaves state untouched and an orphan for the next sweep, so the
        // stage simply reruns.
        let scratch = self.store.scratch_path(&format!("{}.md", post.slug));
        let staged = crate::store::frontmatter::render(&post, &post.body_markdown)?;
        self.store.atomic_write(&scratch, staged.as_bytes())?;

        // Fan out to every platform; failures count, they don't abort.
        let outcomes = fan_out(publishers, &post, &self.store, cancel);
        for outcome in &outcomes {
            let entry = report.deliveries.entry(outcome.platform.clone()).or_insert((0, 0));
            match &outcome.result {
                Ok(_) => {
                    entry.0 += 1;
                    post.platforms_published.insert(outcome.platform.clone());
                }
                Err(e) => {
                    entry.1 += 1;
                    report
                        .diagnostics
                        .push(format!("{} delivery failed: {}", outcome.platform, e));
                }
            }
        }

        // The staged copy becomes the canonical markdown artifact. After
        // this rename, the file the state record points at is on disk.
        let canonical = self.store.blog_platform_path("markdown", &post.slug);
        if let Some(dir) = canonical.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::rename(&scratch, &canonical)?;

        blog_state.upsert(BlogStateEntry {
            slug: post.slug.clone(),
            post_type: post.post_type,
            theme,
            generated_at: Utc::now(),
            source_dates: post.source_dates.clone(),
            file_path: canonical.display().to_string(),
            config_fingerprint: fingerprint.to_string(),
            stale: false,
        });
        self.store.save_blog_state(blog_state)?;

        blog_memory.record(BlogMemoryEntry {
            slug: post.slug.clone(),
            date: post.date,
            key_points: post.key_points.clone(),
            examples_used: post.examples_used.clone(),
        });
        self.store.save_blog_memory(blog_memory)?;

        memory.record_published(PublishedRecord {
            slug: post.slug.clone(),
            title: post.title.clone(),
            post_type: post.post_type,
            date: post.date,
            platforms: post.platforms_published.iter().cloned().collect(),
        });
        self.store.commit_memory(memory)?;

        report.posts_generated.push(post.slug.clone());
        Ok(())
    }
}

/// Deterministic memory contribution of one day's sessions.
fn memory_update_for(sessions: &[Session]) -> MemoryUpdate {
    let mut themes: BTreeSet<String> = BTreeSet::new();
    let mut insights = Vec::new();
    let mut entities: Vec<(String, String, String)> = Vec::new();
    let mut session_ids = Vec::new();

    for session in sessions {
        session_ids.push(session.item.id.clone());

        // Themes: derived activity tags plus the project, never the raw
        // source tag.
        for tag in &session.item.tags {
            let tag = tag.as_str();
            if tag == "ai-session" || tag == session.item.source.as_str() {
                continue;
            }
            themes.insert(tag.to_string());
        }
        let project = session.project().to_string();
        if project != crate::types::UNASSIGNED_PROJECT {
            themes.insert(project.clone());
            entities.push((
                project,
                "project".to_string(),
                session.item.title.clone(),
            ));
        }
        for tool in session.tool_usage.keys() {
            entities.push((tool.clone(), "tool".to_string(), session.item.title.clone()));
        }

        insights.extend(session.learnings.iter().cloned());
    }

    session_ids.sort();
    MemoryUpdate {
        session_ids,
        read_ids: vec![],
        themes: themes.into_iter().collect(),
        insights,
        decisions: vec![],
        open_questions: vec![],
        entities,
    }
}

/// Group a day's external items into the digest document.
fn render_digest(date: NaiveDate, items: &[ContentItem]) -> String {
    let mut by_source: BTreeMap<&str, Vec<&ContentItem>> = BTreeMap::new();
    for item in items {
        by_source.entry(item.source.as_str()).or_default().push(item);
    }

    let mut out = format!("---\ndate: {}\nitems: {}\n---\n\n# Reading digest {}\n", date, items.len(), date);
    for (source, items) in by_source {
        out.push_str(&format!("\n## {}\n\n", source));
        for item in items {
            match &item.url {
                Some(url) => out.push_str(&format!("- [{}]({})", item.title, url)),
                None => out.push_str(&format!("- {}", item.title)),
            }
            if !item.excerpt.is_empty() {
                out.push_str(&format!(" — {}", item.excerpt));
            }
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentKind, FileAction, OutcomeEvent, Source};
    use std::collections::BTreeMap as Map;

    fn session(id: &str, project: &str, learning: Option<&str>) -> Session {
        let now = Utc::now();
        let mut tool_usage = Map::new();
        tool_usage.insert("Edit".to_string(), 2u32);
        Session {
            item: ContentItem {
                id: id.to_string(),
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
                tags: ["ai-session", "chat-log", "debugging"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                topics: Default::default(),
                project: Some(project.to_string()),
                metadata: serde_json::json!({}),
            },
            started_at: now,
            ended_at: now,
            duration_seconds: Some(0),
            tool_usage,
            outcomes: vec![OutcomeEvent::FileModified {
                path: "/p/src/lib.rs".to_string(),
                action: FileAction::Edited,
            }],
            agent_signals: vec![],
            learnings: learning.map(|l| vec![l.to_string()]).unwrap_or_default(),
        }
    }

    #[test]
    fn memory_update_skips_base_tags() {
        let update = memory_update_for(&[session("s1", "alpha", Some("keep budgets bounded"))]);
        assert!(update.themes.contains(&"debugging".to_string()));
        assert!(update.themes.contains(&"alpha".to_string()));
        assert!(!update.themes.contains(&"ai-session".to_string()));
        assert!(!update.themes.contains(&"chat-log".to_string()));
        assert_eq!(update.insights, vec!["keep budgets bounded"]);
        assert!(update
            .entities
            .iter()
            .any(|(name, kind, _)| name == "alpha" && kind == "project"));
        assert!(update
            .entities
            .iter()
            .any(|(name, kind, _)| name == "Edit" && kind == "tool"));
    }

    #[test]
    fn digest_groups_by_source() {
        let now = Utc::now();
        let item = ContentItem {
            id: "rss-1".to_string(),
            source: Source::Rss,
            kind: ContentKind::Article,
            title: "Fan-in parsers".to_string(),
            body: String::new(),
            excerpt: "Merging formats".to_string(),
            url: Some("https://example.com/a".to_string()),
            author: None,
            site_name: None,
            published_at: None,
            ingested_at: now,
            tags: Default::default(),
            topics: Default::default(),
            project: None,
            metadata: serde_json::json!({}),
        };
        let digest = render_digest(NaiveDate::from_ymd_opt(2026, 2, 8).unwrap(), &[item]);
        assert!(digest.contains("# Reading digest 2026-02-08"));
        assert!(digest.contains("## rss"));
        assert!(digest.contains("[Fan-in parsers](https://example.com/a)"));
    }

    #[test]
    fn report_render_mentions_everything() {
        let mut report = RunReport::default();
        report.ingested_by_source.insert("chat-log".to_string(), 3);
        report
            .journals_generated
            .push(NaiveDate::from_ymd_opt(2026, 2, 8).unwrap());
        report.posts_generated.push("weekly-2026-W06".to_string());
        report.deliveries.insert("markdown".to_string(), (1, 0));
        report
            .pending_dates
            .push(NaiveDate::from_ymd_opt(2026, 2, 9).unwrap());

        let rendered = report.render();
        assert!(rendered.contains("chat-log"));
        assert!(rendered.contains("Journals: 1 generated"));
        assert!(rendered.contains("weekly-2026-W06"));
        assert!(rendered.contains("Pending dates: 2026-02-09"));
    }
}
