//! Ingestion layer
//!
//! This module fans out over all configured source parsers, collects their
//! raw records, and hands the combined stream to the normalizer.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌────────────────┐
//! │ Source roots │ ──► │ IngestRunner │ ──► │ NormalizedBatch│
//! │ feeds, logs  │     │ (worker pool)│     │ (by date)      │
//! └──────────────┘     └──────────────┘     └────────────────┘
//!                            │
//!                            ▼
//!                  ┌─────────────────────┐
//!                  │  SourceParser       │
//!                  │  ├─ ChatLogParser   │
//!                  │  ├─ RolloutParser   │
//!                  │  ├─ MultiAgentParser│
//!                  │  ├─ FeedParser      │
//!                  │  └─ ...             │
//!                  └─────────────────────┘
//! ```
//!
//! Parsing is read-only: a failed or cancelled run leaves no trace in the
//! store, because parsers cannot write.

pub mod normalize;
mod parser;
pub mod parsers;

pub use normalize::{normalize, NormalizedBatch};
pub use parser::{ParseContext, ParseOutput, SourceLocation, SourceParser, SourcePattern};

use crate::error::Result;
use crate::types::{ContentItem, Session};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;

/// Outcome of one ingestion pass across all sources.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Records ingested per source (sessions and items combined)
    pub counts_by_source: BTreeMap<String, usize>,
    /// Soft diagnostics from parsers (skipped records and files)
    pub warnings: Vec<String>,
    /// Sources that failed entirely (source name → error message)
    pub failed_sources: Vec<(String, String)>,
}

/// Raw, un-normalized output of one ingestion pass.
#[derive(Debug, Default)]
pub struct IngestOutput {
    pub items: Vec<ContentItem>,
    pub sessions: Vec<Session>,
    pub report: IngestReport,
}

/// Fans ingestion out over all registered parsers.
pub struct IngestRunner {
    parsers: Vec<Box<dyn SourceParser>>,
    workers: usize,
}

impl IngestRunner {
    pub fn new(parsers: Vec<Box<dyn SourceParser>>, workers: usize) -> Self {
        Self {
            parsers,
            workers: workers.max(1),
        }
    }

    /// Parsers whose sources have something to read.
    pub fn available_parsers(&self) -> Vec<&dyn SourceParser> {
        self.parsers
            .iter()
            .filter(|p| p.is_available())
            .map(|p| p.as_ref())
            .collect()
    }

    /// Discover and parse everything inside the lookback window.
    ///
    /// Per-record and per-file problems surface as warnings; a source whose
    /// root cannot be read at all is recorded in `failed_sources` and the
    /// other sources continue.
    pub fn run(&self, since: DateTime<Utc>, cancel: &AtomicBool) -> Result<IngestOutput> {
        let mut output = IngestOutput::default();

        // Discovery is quick and sequential; parsing fans out below.
        let mut jobs: Vec<(usize, SourceLocation)> = Vec::new();
        for (index, parser) in self.parsers.iter().enumerate() {
            if !parser.is_available() {
                tracing::debug!(source = %parser.source(), "Source not available, skipping");
                continue;
            }
            match parser.discover(since) {
                Ok(locations) => {
                    tracing::info!(
                        source = %parser.source(),
                        count = locations.len(),
                        "Discovered source locations"
                    );
                    jobs.extend(locations.into_iter().map(|l| (index, l)));
                }
                Err(e) => {
                    tracing::warn!(source = %parser.source(), error = %e, "Source discovery failed");
                    output
                        .report
                        .failed_sources
                        .push((parser.source().to_string(), e.to_string()));
                }
            }
        }

        let results = self.parse_all(jobs, since, cancel);

        for (source, result) in results {
            match result {
                Ok(parsed) => {
                    let count = parsed.items.len() + parsed.sessions.len();
                    *output.report.counts_by_source.entry(source).or_insert(0) += count;
                    output.items.extend(parsed.items);
                    output.sessions.extend(parsed.sessions);
                    output.report.warnings.extend(parsed.warnings);
                }
                Err(e) => {
                    output.report.failed_sources.push((source, e.to_string()));
                }
            }
        }

        for warning in &output.report.warnings {
            tracing::warn!(warning = %warning, "Parse diagnostic");
        }

        Ok(output)
    }

    /// Run parse jobs on a bounded worker pool.
    fn parse_all(
        &self,
        jobs: Vec<(usize, SourceLocation)>,
        since: DateTime<Utc>,
        cancel: &AtomicBool,
    ) -> Vec<(String, Result<ParseOutput>)> {
        if jobs.is_empty() {
            return Vec::new();
        }

        let worker_count = self.workers.min(jobs.len());
        let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, SourceLocation)>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();

        for job in jobs {
            job_tx.send(job).expect("job channel open");
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for _ in 0..worker_count {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let parsers = &self.parsers;
                scope.spawn(move || {
                    while let Ok((index, location)) = job_rx.recv() {
                        if cancel.load(std::sync::atomic::Ordering::Relaxed) {
                            break;
                        }
                        let parser = &parsers[index];
                        let ctx = ParseContext {
                            location: &location,
                            since,
                            cancel,
                        };
                        let result = parser.parse(&ctx);
                        if result_tx.send((parser.source().to_string(), result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            result_rx.iter().collect()
        })
    }
}
