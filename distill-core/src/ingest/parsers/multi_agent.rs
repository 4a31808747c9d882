//! Multi-agent state-tree parser
//!
//! Parses hierarchical mission state directories laid out as
//! `<root>/<mission>/cycles/<cycle>/tasks/*.toml`. Each task file records
//! one task execution, which becomes a session. Inter-agent signals are
//! first-class ordered events; task descriptions, learnings, and quality
//! ratings are preserved verbatim.

use crate::error::{Error, Result};
use crate::ingest::parser::{ParseContext, ParseOutput, SourceLocation, SourceParser, SourcePattern};
use crate::types::{
    AgentSignal, ContentItem, ContentKind, FileAction, OutcomeEvent, Session, Source,
    META_NATIVE_ID,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use super::chat_log::truncate;

/// Parser for multi-agent mission state trees.
pub struct MultiAgentParser {
    root: Option<PathBuf>,
}

impl MultiAgentParser {
    /// Create a new parser with the default root path (~/.vermas/missions).
    pub fn new() -> Self {
        Self {
            root: dirs::home_dir().map(|h| h.join(".vermas").join("missions")),
        }
    }

    /// Create a parser with a custom root path (for testing and overrides).
    pub fn with_root(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }
}

impl Default for MultiAgentParser {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================
// Raw task-file records (serde deserialization)
// ============================================

#[derive(Debug, Deserialize)]
struct TaskFile {
    task: TaskMeta,
    #[serde(default)]
    signals: Vec<SignalRecord>,
    #[serde(default)]
    tools: BTreeMap<String, u32>,
    #[serde(default)]
    outcomes: Vec<OutcomeRecord>,
}

#[derive(Debug, Deserialize)]
struct TaskMeta {
    id: Option<String>,
    description: String,
    started_at: String,
    ended_at: Option<String>,
    cwd: Option<String>,
    quality: Option<String>,
    #[serde(default)]
    learnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SignalRecord {
    ts: String,
    agent_id: String,
    role: String,
    signal: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct OutcomeRecord {
    kind: String,
    path: Option<String>,
    action: Option<String>,
    command: Option<String>,
    ok: Option<bool>,
    name: Option<String>,
}

impl SourceParser for MultiAgentParser {
    fn source(&self) -> Source {
        Source::MultiAgent
    }

    fn root_path(&self) -> Option<PathBuf> {
        self.root.clone()
    }

    fn source_patterns(&self) -> Vec<SourcePattern> {
        vec![SourcePattern {
            pattern: "*/cycles/*/tasks/*.toml".to_string(),
            description: "multi-agent task executions".to_string(),
        }]
    }

    fn parse(&self, ctx: &ParseContext) -> Result<ParseOutput> {
        let path = match ctx.location {
            SourceLocation::Path(p) => p,
            SourceLocation::Url(u) => {
                return Err(Error::Parse {
                    source_name: self.source().to_string(),
                    message: format!("multi-agent parser cannot read URL {}", u),
                })
            }
        };

        let mut output = ParseOutput::default();
        match parse_task_file(path) {
            Ok((session, warnings)) => {
                output.sessions.push(session);
                output.warnings.extend(warnings);
            }
            Err(e) => {
                output
                    .warnings
                    .push(format!("{}: skipped task file: {}", path.display(), e));
            }
        }
        Ok(output)
    }
}

fn parse_task_file(path: &Path) -> Result<(Session, Vec<String>)> {
    let content = std::fs::read_to_string(path)?;
    let task_file: TaskFile = toml::from_str(&content).map_err(|e| Error::Parse {
        source_name: Source::MultiAgent.to_string(),
        message: e.to_string(),
    })?;

    let mut warnings = Vec::new();
    let ingested_at = Utc::now();

    // Mission and cycle come from the path: <mission>/cycles/<cycle>/tasks/<task>.toml
    let components: Vec<String> = path
        .iter()
        .map(|c| c.to_string_lossy().to_string())
        .collect();
    let mission = components
        .iter()
        .rev()
        .nth(4)
        .cloned()
        .unwrap_or_else(|| "unknown-mission".to_string());
    let cycle = components
        .iter()
        .rev()
        .nth(2)
        .cloned()
        .unwrap_or_else(|| "0".to_string());

    let file_stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let native_id = task_file
        .task
        .id
        .clone()
        .unwrap_or_else(|| format!("{}/{}/{}", mission, cycle, file_stem));

    let started_at = parse_ts_str(&task_file.task.started_at).unwrap_or_else(|| {
        warnings.push(format!(
            "{}: unreadable started_at, anchoring at ingest time",
            path.display()
        ));
        ingested_at
    });
    let ended_at = task_file
        .task
        .ended_at
        .as_deref()
        .and_then(parse_ts_str)
        .unwrap_or(started_at);

    let mut agent_signals = Vec::new();
    for (i, record) in task_file.signals.iter().enumerate() {
        let Some(ts) = parse_ts_str(&record.ts) else {
            warnings.push(format!(
                "{}: signal {} has unreadable timestamp, skipped",
                path.display(),
                i
            ));
            continue;
        };
        agent_signals.push(AgentSignal {
            ts,
            agent_id: record.agent_id.clone(),
            role: record.role.clone(),
            signal: record.signal.clone(),
            message: record.message.clone(),
        });
    }

    let mut outcomes = Vec::new();
    for (i, record) in task_file.outcomes.iter().enumerate() {
        match outcome_from_record(record) {
            Some(outcome) => outcomes.push(outcome),
            None => warnings.push(format!(
                "{}: outcome {} has unknown kind {:?}, skipped",
                path.display(),
                i,
                record.kind
            )),
        }
    }

    // The description is the narrative identity of a task execution; it is
    // carried verbatim as both title seed and metadata.
    let description = task_file.task.description.clone();
    let title = truncate(description.lines().next().unwrap_or(&description).trim(), 80).to_string();
    let body = description.clone();
    let excerpt = truncate(body.trim(), 200).to_string();

    let mut metadata = serde_json::json!({
        META_NATIVE_ID: native_id,
        "mission": mission,
        "cycle": cycle,
        "task_description": description,
    });
    if let Some(cwd) = &task_file.task.cwd {
        metadata["cwd"] = serde_json::Value::String(cwd.clone());
    }
    if let Some(quality) = &task_file.task.quality {
        metadata["quality"] = serde_json::Value::String(quality.clone());
    }

    let item = ContentItem {
        id: String::new(),
        source: Source::MultiAgent,
        kind: ContentKind::Session,
        title,
        body,
        excerpt,
        url: None,
        author: None,
        site_name: None,
        published_at: None,
        ingested_at,
        tags: BTreeSet::new(),
        topics: BTreeSet::new(),
        project: None,
        metadata,
    };

    let session = Session {
        item,
        started_at,
        ended_at,
        duration_seconds: None,
        tool_usage: task_file.tools,
        outcomes,
        agent_signals,
        learnings: task_file.task.learnings,
    };

    Ok((session, warnings))
}

fn outcome_from_record(record: &OutcomeRecord) -> Option<OutcomeEvent> {
    match record.kind.as_str() {
        "file" => {
            let path = record.path.clone()?;
            let action = match record.action.as_deref() {
                Some("created") => FileAction::Created,
                Some("edited") | None => FileAction::Edited,
                Some(_) => return None,
            };
            Some(OutcomeEvent::FileModified { path, action })
        }
        "command" => Some(OutcomeEvent::CommandRun {
            command: record.command.clone()?,
            ok: record.ok.unwrap_or(true),
        }),
        "signal" => Some(OutcomeEvent::SignalEmitted {
            name: record.name.clone()?,
        }),
        _ => None,
    }
}

fn parse_ts_str(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
