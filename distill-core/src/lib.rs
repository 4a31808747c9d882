//! # distill-core
//!
//! Core library for distill: a batch pipeline that turns AI coding-session
//! logs and reading activity into daily journals, weekly and thematic blog
//! posts, and per-platform publication artifacts.
//!
//! ## Architecture
//!
//! Data flows through the stages in order:
//!
//! ```text
//! parsers → normalizer → analyzer → journal synthesis → blog synthesis → publishers
//!                              ↑↓ unified memory (rolling, durable)
//! ```
//!
//! The store owns every durable byte; parsers and synthesizers are
//! stateless. The LLM lives outside the process, behind
//! [`llm::LlmWorker`]. State and pending flags make re-runs cheap: with no
//! new inputs and no force flag, a run produces zero writes.
//!
//! ## Example
//!
//! ```rust,no_run
//! use distill_core::{Config, Pipeline, RunOptions};
//! use std::sync::atomic::AtomicBool;
//!
//! let config = Config::load().expect("failed to load config");
//! let pipeline = Pipeline::new(config).expect("failed to open store");
//! let cancel = AtomicBool::new(false);
//! let report = pipeline.run(&RunOptions::default(), &cancel).expect("run failed");
//! println!("{}", report.render());
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{Pipeline, RunOptions, RunReport};
pub use store::Store;
pub use types::*;

// Public modules
pub mod analyze;
pub mod blog;
pub mod config;
pub mod error;
pub mod ingest;
pub mod journal;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod publish;
pub mod store;
pub mod types;
