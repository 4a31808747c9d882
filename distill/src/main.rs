//! distill - turn AI coding sessions and reading activity into journals
//! and blog posts
//!
//! Thin CLI over distill-core: loads configuration, initializes logging,
//! runs the pipeline for a date range, and prints the end-of-run report.
//!
//! Uses XDG Base Directory locations:
//! - Output: configurable, default $XDG_DATA_HOME/distill
//! - Logs: $XDG_STATE_HOME/distill/distill.log
//! - Config: $XDG_CONFIG_HOME/distill/config.toml

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use distill_core::{Config, NoteTarget, Pipeline, RunOptions};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "distill")]
#[command(about = "Synthesize journals and blog posts from AI coding activity")]
#[command(version)]
struct Args {
    /// Use a specific config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline for a date range
    Run {
        /// First date to process (YYYY-MM-DD)
        #[arg(long)]
        since: Option<NaiveDate>,
        /// Last date to process (YYYY-MM-DD)
        #[arg(long)]
        until: Option<NaiveDate>,
        /// Regenerate even when artifacts are up to date
        #[arg(long)]
        force: bool,
    },
    /// Generate the journal for one date (no blog, no publish)
    Journal {
        /// Date to generate (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        force: bool,
    },
    /// Generate blog posts from existing journals
    Blog {
        #[arg(long)]
        force: bool,
    },
    /// Show pipeline state: coverage, pending dates, seeds and notes
    Status,
    /// Manage idea seeds
    Seed {
        #[command(subcommand)]
        command: SeedCommand,
    },
    /// Manage editorial notes
    Note {
        #[command(subcommand)]
        command: NoteCommand,
    },
}

#[derive(Subcommand)]
enum SeedCommand {
    /// Add a seed idea
    Add {
        text: String,
        /// Comma-separated tags
        #[arg(long, default_value = "")]
        tags: String,
    },
    /// List all seeds
    List,
}

#[derive(Subcommand)]
enum NoteCommand {
    /// Add an editorial note
    Add {
        text: String,
        /// Target: empty for global, `week:2026-W06`, or `theme:<slug>`
        #[arg(long, default_value = "")]
        target: String,
    },
    /// List all notes
    List,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let mut config = Config::load_from(path).context("failed to load configuration")?;
            config.apply_env();
            config
        }
        None => Config::load().context("failed to load configuration")?,
    };

    let _log_guard =
        distill_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("distill starting");

    // Ctrl-C flips the shared cancellation flag; workers stop between
    // records, retries, and platforms.
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            eprintln!("\ninterrupt received, finishing safely...");
            cancel.store(true, Ordering::Relaxed);
        })
        .context("failed to install interrupt handler")?;
    }

    match args.command {
        Command::Run { since, until, force } => {
            let opts = RunOptions {
                since,
                until,
                force_regenerate: force,
                ..Default::default()
            };
            run_pipeline(config, opts, &cancel)
        }
        Command::Journal { date, force } => {
            let opts = RunOptions {
                since: Some(date),
                until: Some(date),
                force_regenerate: force,
                journals_only: true,
                ..Default::default()
            };
            run_pipeline(config, opts, &cancel)
        }
        Command::Blog { force } => {
            let opts = RunOptions {
                force_regenerate: force,
                blog_only: true,
                ..Default::default()
            };
            run_pipeline(config, opts, &cancel)
        }
        Command::Status => show_status(config),
        Command::Seed { command } => manage_seeds(config, command),
        Command::Note { command } => manage_notes(config, command),
    }
}

fn run_pipeline(config: Config, opts: RunOptions, cancel: &AtomicBool) -> Result<()> {
    let pipeline = Pipeline::new(config).context("failed to open output store")?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    spinner.set_message("running pipeline...");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = pipeline.run(&opts, cancel);
    spinner.finish_and_clear();

    let report = result.context("pipeline run failed")?;
    print!("{}", report.render());

    if cancel.load(Ordering::Relaxed) {
        println!("run was interrupted; committed work is kept, the rest will rerun");
    }
    Ok(())
}

fn show_status(config: Config) -> Result<()> {
    let pipeline = Pipeline::new(config).context("failed to open output store")?;
    let store = pipeline.store();

    let journals = store.list_journals().context("failed to list journals")?;
    let blog_state = store.load_blog_state().context("failed to load blog state")?;
    let pending = store.load_pending().context("failed to load pending flags")?;
    let seeds = store.load_seeds().context("failed to load seeds")?;
    let notes = store.load_notes().context("failed to load notes")?;

    println!("Journals: {}", journals.len());
    if let (Some(first), Some(last)) = (journals.first(), journals.last()) {
        println!("  from {} to {}", first.date, last.date);
    }
    println!("Blog posts: {}", blog_state.posts.len());
    let stale = blog_state.posts.iter().filter(|p| p.stale).count();
    if stale > 0 {
        println!("  {} stale (will regenerate on next blog run)", stale);
    }

    let pending_dates = pending.pending_dates();
    if pending_dates.is_empty() {
        println!("Pending dates: none");
    } else {
        let dates: Vec<String> = pending_dates.iter().map(|d| d.to_string()).collect();
        println!("Pending dates: {}", dates.join(", "));
    }

    let unused_seeds = seeds.iter().filter(|s| !s.used).count();
    let unused_notes = notes.iter().filter(|n| !n.used).count();
    println!("Seeds: {} total, {} unused", seeds.len(), unused_seeds);
    println!("Notes: {} total, {} unused", notes.len(), unused_notes);
    Ok(())
}

fn manage_seeds(config: Config, command: SeedCommand) -> Result<()> {
    let pipeline = Pipeline::new(config).context("failed to open output store")?;
    let store = pipeline.store();

    match command {
        SeedCommand::Add { text, tags } => {
            let tags: Vec<String> = tags
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            let seed = store.add_seed(&text, tags).context("failed to add seed")?;
            println!("added seed {}", seed.id);
        }
        SeedCommand::List => {
            for seed in store.load_seeds().context("failed to load seeds")? {
                let status = if seed.used {
                    format!("used in {}", seed.used_in.as_deref().unwrap_or("?"))
                } else {
                    "unused".to_string()
                };
                println!("{}  [{}]  {}", seed.id, status, seed.text);
            }
        }
    }
    Ok(())
}

fn manage_notes(config: Config, command: NoteCommand) -> Result<()> {
    let pipeline = Pipeline::new(config).context("failed to open output store")?;
    let store = pipeline.store();

    match command {
        NoteCommand::Add { text, target } => {
            let target = NoteTarget::parse(&target)
                .map_err(|e| anyhow::anyhow!("invalid target: {}", e))?;
            let note = store.add_note(&text, target).context("failed to add note")?;
            println!("added note {}", note.id);
        }
        NoteCommand::List => {
            for note in store.load_notes().context("failed to load notes")? {
                let target = note.target.to_string();
                let target = if target.is_empty() { "global".to_string() } else { target };
                let status = if note.used { "used" } else { "unused" };
                println!("{}  [{}] [{}]  {}", note.id, target, status, note.text);
            }
        }
    }
    Ok(())
}
