//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/distill/config.toml`, layered as
//! defaults < file < environment (`DISTILL_*`). Unknown keys in the file are
//! rejected rather than silently ignored. Per-run options (dates, force)
//! live on [`crate::pipeline::RunOptions`], not here.

use crate::error::{Error, Result};
use crate::types::Source;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;

/// Main configuration struct
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub sessions: SessionsConfig,

    #[serde(default)]
    pub journal: JournalConfig,

    #[serde(default)]
    pub blog: BlogConfig,

    #[serde(default)]
    pub intake: IntakeConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Known projects; descriptions are injected into prompts when the
    /// project appears in context, roots feed project attribution
    #[serde(default)]
    pub projects: Vec<ProjectSpec>,

    #[serde(default)]
    pub publishers: PublishersConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where persisted artifacts live
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Root of all persisted artifacts (journals, posts, state, memory)
    #[serde(default = "default_output_directory")]
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_directory(),
        }
    }
}

fn default_output_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("distill")
}

/// Session source discovery
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionsConfig {
    /// Which session dialects to ingest
    #[serde(default = "default_session_sources")]
    pub sources: Vec<Source>,

    /// Include user-wide session paths in discovery, not just per-project ones
    #[serde(default = "default_true")]
    pub include_global: bool,

    /// Lookback window for parser discovery, in days
    #[serde(default = "default_since_days")]
    pub since_days: u32,

    /// Override root for chat-log session trees
    pub chat_log_root: Option<PathBuf>,
    /// Override root for rollout session trees
    pub rollout_root: Option<PathBuf>,
    /// Override root for multi-agent state trees
    pub multi_agent_root: Option<PathBuf>,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            sources: default_session_sources(),
            include_global: true,
            since_days: default_since_days(),
            chat_log_root: None,
            rollout_root: None,
            multi_agent_root: None,
        }
    }
}

fn default_session_sources() -> Vec<Source> {
    vec![Source::ChatLog, Source::Rollout, Source::MultiAgent]
}

fn default_since_days() -> u32 {
    7
}

fn default_true() -> bool {
    true
}

/// Journal synthesis options
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JournalConfig {
    /// Prompt template key
    #[serde(default = "default_journal_style")]
    pub style: String,

    /// Target length; generated entries outside ±50% trigger one re-prompt
    #[serde(default = "default_journal_words")]
    pub target_word_count: usize,

    /// How many days of memory threads count as "active" for daily context
    #[serde(default = "default_memory_window_days")]
    pub memory_window_days: u32,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            style: default_journal_style(),
            target_word_count: default_journal_words(),
            memory_window_days: default_memory_window_days(),
        }
    }
}

fn default_journal_style() -> String {
    "dev-journal".to_string()
}

fn default_journal_words() -> usize {
    500
}

fn default_memory_window_days() -> u32 {
    7
}

/// Blog synthesis options
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlogConfig {
    #[serde(default = "default_blog_words")]
    pub target_word_count: usize,

    /// Insert a diagram block when the post shows structural cues
    #[serde(default)]
    pub include_diagrams: bool,

    /// Platform identifiers to fan out to
    #[serde(default = "default_platforms")]
    pub platforms: Vec<String>,

    /// Weeks with fewer journals than this are skipped
    #[serde(default = "default_min_journals_for_weekly")]
    pub min_journals_for_weekly: usize,

    /// Thread mention count needed inside the candidate window
    #[serde(default = "default_theme_mention_threshold")]
    pub theme_mention_threshold: u32,

    /// Sliding window, in days, over which theme mentions are counted
    #[serde(default = "default_theme_window_days")]
    pub theme_window_days: u32,

    /// A theme must have been seen within this many days to be a candidate
    #[serde(default = "default_theme_recency_days")]
    pub theme_recency_days: u32,

    /// How many prior posts contribute to the avoid-list
    #[serde(default = "default_avoid_list_posts")]
    pub avoid_list_posts: usize,

    /// Fraction of candidate key points that may overlap the avoid-list
    /// before a re-prompt is issued
    #[serde(default = "default_overlap_threshold")]
    pub overlap_threshold: f64,
}

impl Default for BlogConfig {
    fn default() -> Self {
        Self {
            target_word_count: default_blog_words(),
            include_diagrams: false,
            platforms: default_platforms(),
            min_journals_for_weekly: default_min_journals_for_weekly(),
            theme_mention_threshold: default_theme_mention_threshold(),
            theme_window_days: default_theme_window_days(),
            theme_recency_days: default_theme_recency_days(),
            avoid_list_posts: default_avoid_list_posts(),
            overlap_threshold: default_overlap_threshold(),
        }
    }
}

fn default_blog_words() -> usize {
    1200
}

fn default_platforms() -> Vec<String> {
    vec!["markdown".to_string()]
}

fn default_min_journals_for_weekly() -> usize {
    3
}

fn default_theme_mention_threshold() -> u32 {
    3
}

fn default_theme_window_days() -> u32 {
    14
}

fn default_theme_recency_days() -> u32 {
    30
}

fn default_avoid_list_posts() -> usize {
    10
}

fn default_overlap_threshold() -> f64 {
    0.4
}

/// External content intake
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntakeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// RSS/Atom feed URLs
    #[serde(default)]
    pub feeds: Vec<String>,

    /// Browser history database paths (Firefox places shape)
    #[serde(default)]
    pub browser_profiles: Vec<PathBuf>,

    /// Newsletter export directories (containing posts.csv)
    #[serde(default)]
    pub newsletter_exports: Vec<PathBuf>,

    /// Offset applied when bucketing records into calendar dates, in minutes
    #[serde(default)]
    pub timezone_offset_minutes: i32,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            feeds: vec![],
            browser_profiles: vec![],
            newsletter_exports: vec![],
            timezone_offset_minutes: 0,
        }
    }
}

/// Rolling memory maintenance
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Days without a mention before a thread is flagged dormant
    #[serde(default = "default_dormant_after_days")]
    pub dormant_after_days: u32,

    /// Daily entries older than this are compacted into summary strings
    #[serde(default = "default_compact_horizon_days")]
    pub compact_horizon_days: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            dormant_after_days: default_dormant_after_days(),
            compact_horizon_days: default_compact_horizon_days(),
        }
    }
}

fn default_dormant_after_days() -> u32 {
    14
}

fn default_compact_horizon_days() -> u32 {
    90
}

/// External LLM worker
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Program invoked with the prompt on stdin; markdown expected on stdout
    #[serde(default = "default_llm_command")]
    pub command: String,

    /// Extra arguments placed before the model flag
    #[serde(default = "default_llm_args")]
    pub args: Vec<String>,

    /// Model selection string, passed through unchanged
    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Attempts per synthesis before the date is flagged pending
    #[serde(default = "default_llm_retries")]
    pub retries: u32,

    /// Parallel synthesis workers
    #[serde(default = "default_llm_workers")]
    pub workers: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            command: default_llm_command(),
            args: default_llm_args(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            retries: default_llm_retries(),
            workers: default_llm_workers(),
        }
    }
}

fn default_llm_command() -> String {
    "claude".to_string()
}

fn default_llm_args() -> Vec<String> {
    vec!["-p".to_string()]
}

fn default_llm_model() -> String {
    "sonnet".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_llm_retries() -> u32 {
    3
}

fn default_llm_workers() -> usize {
    2
}

/// Worker pool sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Parallel source parsers
    #[serde(default = "default_parser_workers")]
    pub parser_workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parser_workers: default_parser_workers(),
        }
    }
}

fn default_parser_workers() -> usize {
    8
}

/// A known project; the description is injected into every prompt whose
/// context touches the project.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectSpec {
    pub name: String,
    pub description: String,
    pub url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Filesystem roots used for longest-prefix project attribution
    #[serde(default)]
    pub roots: Vec<PathBuf>,
}

/// Publisher endpoints
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct PublishersConfig {
    pub vault: Option<VaultPublisherConfig>,
    pub cms: Option<CmsPublisherConfig>,
    pub scheduler: Option<SchedulerPublisherConfig>,
}

/// Local note-vault target (wiki-links + front matter)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VaultPublisherConfig {
    pub directory: PathBuf,
}

/// Ghost-style CMS target
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CmsPublisherConfig {
    pub url: String,
    pub admin_token: String,
    #[serde(default = "default_publisher_timeout")]
    pub timeout_secs: u64,
}

/// Social-scheduler forwarding target
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerPublisherConfig {
    pub url: String,
    pub api_key: String,
    /// Downstream networks the scheduler should post to
    #[serde(default)]
    pub networks: Vec<String>,
    #[serde(default = "default_publisher_timeout")]
    pub timeout_secs: u64,
}

fn default_publisher_timeout() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path, then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Config::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific path (no env overlay).
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Apply `DISTILL_*` environment overrides for scalar keys.
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("DISTILL_OUTPUT_DIR") {
            self.output.directory = PathBuf::from(dir);
        }
        if let Ok(cmd) = std::env::var("DISTILL_LLM_COMMAND") {
            self.llm.command = cmd;
        }
        if let Ok(model) = std::env::var("DISTILL_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(level) = std::env::var("DISTILL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(cms) = self.publishers.cms.as_mut() {
            if let Ok(token) = std::env::var("DISTILL_CMS_TOKEN") {
                cms.admin_token = token;
            }
        }
        if let Some(scheduler) = self.publishers.scheduler.as_mut() {
            if let Ok(key) = std::env::var("DISTILL_SCHEDULER_KEY") {
                scheduler.api_key = key;
            }
        }
    }

    /// Hash of the synthesis-relevant options. State records carry this so
    /// a config change invalidates otherwise up-to-date artifacts.
    pub fn synthesis_fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.journal.style.as_bytes());
        hasher.update(self.journal.target_word_count.to_le_bytes());
        hasher.update(self.journal.memory_window_days.to_le_bytes());
        hasher.update(self.blog.target_word_count.to_le_bytes());
        hasher.update([self.blog.include_diagrams as u8]);
        hasher.update(self.blog.min_journals_for_weekly.to_le_bytes());
        hasher.update(self.blog.theme_mention_threshold.to_le_bytes());
        hasher.update(self.blog.overlap_threshold.to_le_bytes());
        hasher.update(self.llm.model.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Returns the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("distill")
            .join("config.toml")
    }

    /// Returns the state directory path (for logs)
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("distill")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("distill.log")
    }
}
