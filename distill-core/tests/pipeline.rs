//! Integration tests for the full synthesis pipeline
//!
//! These drive Pipeline end to end over fixture session trees in temp
//! directories, with a scripted worker standing in for the external LLM.

use chrono::NaiveDate;
use distill_core::config::Config;
use distill_core::error::Error;
use distill_core::llm::LlmWorker;
use distill_core::pipeline::{Pipeline, RunOptions};
use distill_core::store::PendingStage;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tempfile::TempDir;

// ============================================
// Fixtures
// ============================================

struct Fixture {
    _sessions_dir: TempDir,
    _output_dir: TempDir,
    config: Config,
}

fn fixture() -> Fixture {
    let sessions_dir = tempfile::tempdir().unwrap();
    let output_dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.output.directory = output_dir.path().to_path_buf();
    config.sessions.sources = vec![distill_core::Source::ChatLog];
    config.sessions.chat_log_root = Some(sessions_dir.path().to_path_buf());
    config.sessions.include_global = false;
    config.intake.enabled = false;
    config.journal.target_word_count = 300;
    config.llm.retries = 1;
    config.llm.workers = 2;
    config.blog.platforms = vec!["markdown".to_string()];

    Fixture {
        _sessions_dir: sessions_dir,
        _output_dir: output_dir,
        config,
    }
}

impl Fixture {
    fn sessions_root(&self) -> &Path {
        self.config.sessions.chat_log_root.as_deref().unwrap()
    }

    /// Write one chat-log session: 45 minutes, project from cwd basename,
    /// Read×3 and Edit×2.
    fn write_session(&self, date: &str, session_id: &str, project: &str) {
        let dir = self.sessions_root().join("projects").join(project);
        std::fs::create_dir_all(&dir).unwrap();

        let mut lines = vec![
            format!(
                r#"{{"role":"user","timestamp":"{date}T09:00:00Z","sessionId":"{session_id}","cwd":"/home/dev/{project}","message":{{"content":"Work on {project} for {date}"}}}}"#
            ),
            format!(
                r#"{{"role":"assistant","timestamp":"{date}T09:05:00Z","message":{{"content":"On it."}}}}"#
            ),
        ];
        for _ in 0..3 {
            lines.push(format!(
                r#"{{"role":"assistant","timestamp":"{date}T09:10:00Z","toolCall":{{"name":"Read","input":{{"file_path":"/home/dev/{project}/src/lib.rs"}}}}}}"#
            ));
        }
        for _ in 0..2 {
            lines.push(format!(
                r#"{{"role":"assistant","timestamp":"{date}T09:20:00Z","toolCall":{{"name":"Edit","input":{{"file_path":"/home/dev/{project}/src/lib.rs"}}}}}}"#
            ));
        }
        lines.push(format!(
            r#"{{"role":"assistant","timestamp":"{date}T09:45:00Z","message":{{"content":"Done."}}}}"#
        ));

        std::fs::write(
            dir.join(format!("{}.jsonl", session_id)),
            lines.join("\n") + "\n",
        )
        .unwrap();
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.config.clone()).unwrap()
    }
}

// ============================================
// Scripted workers
// ============================================

/// Distinguishes journal from blog prompts and returns sized bodies.
struct ScriptedWorker {
    journal_calls: AtomicUsize,
    blog_calls: AtomicUsize,
}

impl ScriptedWorker {
    fn new() -> Self {
        Self {
            journal_calls: AtomicUsize::new(0),
            blog_calls: AtomicUsize::new(0),
        }
    }

    fn journal_body() -> String {
        let mut body = String::from("# A day on alpha\n\n");
        body.push_str(
            &"The work moved steadily and the alpha refactor held together under tests. "
                .repeat(22),
        );
        body
    }

    fn blog_body() -> String {
        "# Week in review\n\n\
         Intro paragraph about the week.\n\n\
         ## What moved\n\n\
         The alpha refactor settled down this week. Sessions stayed short and focused.\n\n\
         ## What we learned\n\n\
         Small batches kept the review queue moving. Nothing piled up.\n"
            .to_string()
    }
}

impl LlmWorker for ScriptedWorker {
    fn invoke(&self, prompt: &str) -> distill_core::Result<String> {
        if prompt.contains("daily journal") {
            self.journal_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Self::journal_body())
        } else {
            self.blog_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Self::blog_body())
        }
    }
}

/// Always times out, as an unreachable worker would.
struct TimeoutWorker;

impl LlmWorker for TimeoutWorker {
    fn invoke(&self, _prompt: &str) -> distill_core::Result<String> {
        Err(Error::LlmTimeout(1))
    }
}

fn d(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn run(
    pipeline: &Pipeline,
    worker: &dyn LlmWorker,
    since: &str,
    until: &str,
    force: bool,
) -> distill_core::RunReport {
    let opts = RunOptions {
        since: Some(d(since)),
        until: Some(d(until)),
        force_regenerate: force,
        ..Default::default()
    };
    let cancel = AtomicBool::new(false);
    pipeline.run_with_worker(worker, &opts, &cancel).unwrap()
}

// ============================================
// Single-day scenarios
// ============================================

#[test]
fn single_day_single_session_produces_journal() {
    let fixture = fixture();
    fixture.write_session("2026-02-08", "s-alpha-1", "alpha");

    let pipeline = fixture.pipeline();
    let worker = ScriptedWorker::new();
    let report = run(&pipeline, &worker, "2026-02-08", "2026-02-08", false);

    assert_eq!(report.journals_generated, vec![d("2026-02-08")]);
    assert_eq!(report.ingested_by_source.get("chat-log"), Some(&1));

    let path = pipeline
        .store()
        .journal_path(d("2026-02-08"), "dev-journal");
    assert!(path.ends_with("journal/journal-2026-02-08-dev-journal.md"));
    assert!(path.exists());

    let entry = pipeline
        .store()
        .read_journal(d("2026-02-08"), "dev-journal")
        .unwrap()
        .unwrap();
    assert_eq!(entry.sessions_count, 1);
    assert_eq!(entry.duration_minutes, 45);
    assert_eq!(entry.projects, vec!["alpha"]);
    assert_eq!(entry.sessions_count, entry.source_session_ids.len());
    assert!(entry.word_count >= 200);
}

#[test]
fn zero_duration_session_still_gets_a_journal() {
    let fixture = fixture();
    let dir = fixture.sessions_root().join("projects").join("alpha");
    std::fs::create_dir_all(&dir).unwrap();
    // A single timestamp: the session starts and ends at the same instant.
    std::fs::write(
        dir.join("s-instant.jsonl"),
        r#"{"role":"user","timestamp":"2026-02-08T09:00:00Z","sessionId":"s-instant","cwd":"/home/dev/alpha","message":{"content":"quick check"}}"#,
    )
    .unwrap();

    let pipeline = fixture.pipeline();
    let worker = ScriptedWorker::new();
    let report = run(&pipeline, &worker, "2026-02-08", "2026-02-08", false);

    assert_eq!(report.journals_generated, vec![d("2026-02-08")]);
    let entry = pipeline
        .store()
        .read_journal(d("2026-02-08"), "dev-journal")
        .unwrap()
        .unwrap();
    assert_eq!(entry.duration_minutes, 0);
    assert_eq!(entry.sessions_count, 1);
}

#[test]
fn rerun_with_no_new_inputs_writes_nothing() {
    let fixture = fixture();
    fixture.write_session("2026-02-08", "s-alpha-1", "alpha");

    let pipeline = fixture.pipeline();
    let worker = ScriptedWorker::new();
    run(&pipeline, &worker, "2026-02-08", "2026-02-08", false);
    let calls_after_first = worker.journal_calls.load(Ordering::SeqCst);

    let journal_path = pipeline
        .store()
        .journal_path(d("2026-02-08"), "dev-journal");
    let mtime_before = std::fs::metadata(&journal_path).unwrap().modified().unwrap();

    let report = run(&pipeline, &worker, "2026-02-08", "2026-02-08", false);

    assert!(report.journals_generated.is_empty());
    assert_eq!(report.journals_skipped, vec![d("2026-02-08")]);
    assert!(report.posts_generated.is_empty());
    assert_eq!(worker.journal_calls.load(Ordering::SeqCst), calls_after_first);
    let mtime_after = std::fs::metadata(&journal_path).unwrap().modified().unwrap();
    assert_eq!(mtime_before, mtime_after);
}

#[test]
fn changed_session_set_regenerates_the_day() {
    let fixture = fixture();
    fixture.write_session("2026-02-08", "s-alpha-1", "alpha");

    let pipeline = fixture.pipeline();
    let worker = ScriptedWorker::new();
    run(&pipeline, &worker, "2026-02-08", "2026-02-08", false);

    // A second session appears for the same date.
    fixture.write_session("2026-02-08", "s-alpha-2", "alpha");
    let report = run(&pipeline, &worker, "2026-02-08", "2026-02-08", false);

    assert_eq!(report.journals_generated, vec![d("2026-02-08")]);
    let entry = pipeline
        .store()
        .read_journal(d("2026-02-08"), "dev-journal")
        .unwrap()
        .unwrap();
    assert_eq!(entry.sessions_count, 2);
}

// ============================================
// Weekly behavior
// ============================================

#[test]
fn weekly_respects_minimum_journal_count() {
    // Two journals in 2026-W06 (Mon + Tue)
    let fixture = fixture();
    fixture.write_session("2026-02-02", "s-mon", "alpha");
    fixture.write_session("2026-02-03", "s-tue", "alpha");

    let pipeline = fixture.pipeline();
    let worker = ScriptedWorker::new();
    let report = run(&pipeline, &worker, "2026-02-02", "2026-02-08", false);

    // Default minimum is 3: no weekly post.
    assert!(!report
        .posts_generated
        .iter()
        .any(|slug| slug.starts_with("weekly-")));
    assert!(!pipeline
        .store()
        .blog_platform_path("markdown", "weekly-2026-W06")
        .exists());
}

#[test]
fn weekly_generated_when_minimum_met() {
    let mut fixture = fixture();
    fixture.config.blog.min_journals_for_weekly = 2;
    fixture.write_session("2026-02-02", "s-mon", "alpha");
    fixture.write_session("2026-02-03", "s-tue", "alpha");

    let pipeline = fixture.pipeline();
    let worker = ScriptedWorker::new();
    let report = run(&pipeline, &worker, "2026-02-02", "2026-02-08", false);

    assert!(report
        .posts_generated
        .contains(&"weekly-2026-W06".to_string()));
    assert!(pipeline
        .store()
        .blog_platform_path("markdown", "weekly-2026-W06")
        .exists());

    let state = pipeline.store().load_blog_state().unwrap();
    let entry = state.find("weekly-2026-W06").unwrap();
    assert_eq!(entry.source_dates, vec![d("2026-02-02"), d("2026-02-03")]);
}

// ============================================
// Failure isolation
// ============================================

#[test]
fn llm_failure_flags_pending_and_blocks_weekly() {
    let mut fixture = fixture();
    fixture.config.blog.min_journals_for_weekly = 1;
    fixture.write_session("2026-02-09", "s-fail", "alpha");

    let pipeline = fixture.pipeline();
    let report = run(&pipeline, &TimeoutWorker, "2026-02-09", "2026-02-09", false);

    // No partial file, date flagged, weekly for the containing week skipped.
    assert!(report.journals_generated.is_empty());
    assert!(!pipeline
        .store()
        .journal_path(d("2026-02-09"), "dev-journal")
        .exists());
    assert_eq!(report.pending_dates, vec![d("2026-02-09")]);
    assert!(report
        .posts_skipped
        .contains(&"weekly-2026-W07".to_string()));

    let pending = pipeline.store().load_pending().unwrap();
    assert!(pending.is_pending(d("2026-02-09"), PendingStage::Journal));

    // The next run retries only this date and clears the flag.
    let worker = ScriptedWorker::new();
    let report = run(&pipeline, &worker, "2026-02-09", "2026-02-09", false);
    assert_eq!(report.journals_generated, vec![d("2026-02-09")]);
    assert_eq!(worker.journal_calls.load(Ordering::SeqCst), 1);
    assert!(report.pending_dates.is_empty());
}

// ============================================
// Force regeneration
// ============================================

#[test]
fn force_regenerate_overwrites_and_staleness_flows_downstream() {
    let mut fixture = fixture();
    fixture.config.blog.min_journals_for_weekly = 3;
    for (date, id) in [
        ("2026-02-02", "s-mon"),
        ("2026-02-03", "s-tue"),
        ("2026-02-04", "s-wed"),
    ] {
        fixture.write_session(date, id, "alpha");
    }

    let pipeline = fixture.pipeline();
    let worker = ScriptedWorker::new();
    let report = run(&pipeline, &worker, "2026-02-02", "2026-02-08", false);
    assert!(report
        .posts_generated
        .contains(&"weekly-2026-W06".to_string()));

    // Force just one journal; its consumers go stale.
    let opts = RunOptions {
        since: Some(d("2026-02-03")),
        until: Some(d("2026-02-03")),
        force_regenerate: true,
        journals_only: true,
        ..Default::default()
    };
    let cancel = AtomicBool::new(false);
    let report = pipeline.run_with_worker(&worker, &opts, &cancel).unwrap();
    assert_eq!(report.journals_generated, vec![d("2026-02-03")]);

    let state = pipeline.store().load_blog_state().unwrap();
    assert!(state.find("weekly-2026-W06").unwrap().stale);

    // The next blog run regenerates the stale weekly.
    let blog_calls_before = worker.blog_calls.load(Ordering::SeqCst);
    let opts = RunOptions {
        since: Some(d("2026-02-02")),
        until: Some(d("2026-02-08")),
        blog_only: true,
        ..Default::default()
    };
    let report = pipeline.run_with_worker(&worker, &opts, &cancel).unwrap();
    assert!(report
        .posts_generated
        .contains(&"weekly-2026-W06".to_string()));
    assert!(worker.blog_calls.load(Ordering::SeqCst) > blog_calls_before);
    assert!(!pipeline
        .store()
        .load_blog_state()
        .unwrap()
        .find("weekly-2026-W06")
        .unwrap()
        .stale);
}

// ============================================
// Thematic posts
// ============================================

#[test]
fn recurring_theme_earns_a_thematic_post_once() {
    let mut fixture = fixture();
    // Keep weeklies out of the way to isolate the thematic path.
    fixture.config.blog.min_journals_for_weekly = 10;
    for (date, id) in [
        ("2026-02-02", "s-a"),
        ("2026-02-04", "s-b"),
        ("2026-02-06", "s-c"),
    ] {
        fixture.write_session(date, id, "alpha");
    }

    let pipeline = fixture.pipeline();
    let worker = ScriptedWorker::new();
    let report = run(&pipeline, &worker, "2026-02-02", "2026-02-08", false);

    // Project "alpha" recurs on three days inside the window.
    assert!(report.posts_generated.contains(&"alpha".to_string()));
    let state = pipeline.store().load_blog_state().unwrap();
    assert!(state.has_thematic_post("alpha"));

    // Re-running with the same inputs does not produce a second post.
    let report = run(&pipeline, &worker, "2026-02-02", "2026-02-08", false);
    assert!(report.posts_generated.is_empty());
    assert!(report.posts_skipped.contains(&"alpha".to_string()));
}

// ============================================
// Memory across runs
// ============================================

#[test]
fn memory_grows_monotonically_across_runs() {
    let fixture = fixture();
    fixture.write_session("2026-02-02", "s-a", "alpha");

    let pipeline = fixture.pipeline();
    let worker = ScriptedWorker::new();
    run(&pipeline, &worker, "2026-02-02", "2026-02-08", false);

    let memory = pipeline.store().load_memory().unwrap();
    let first_count = memory.threads["alpha"].mention_count;
    assert!(first_count >= 1);

    fixture.write_session("2026-02-03", "s-b", "alpha");
    run(&pipeline, &worker, "2026-02-02", "2026-02-08", false);

    let memory = pipeline.store().load_memory().unwrap();
    assert!(memory.threads["alpha"].mention_count > first_count);
    assert_eq!(memory.threads["alpha"].last_seen, d("2026-02-03"));

    // Daily entries carry the session ids for both days.
    assert_eq!(memory.daily_entries.len(), 2);
    assert!(memory.published.len() <= 2);
}
