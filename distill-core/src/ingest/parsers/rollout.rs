//! Rollout session parser
//!
//! Parses directory-per-session logs laid out as
//! `<root>/sessions/<session-dir>/` with a `manifest.json` plus ordered
//! event files under `events/`. Session identity comes from the directory
//! name; start and end timestamps come from the manifest.

use crate::error::{Error, Result};
use crate::ingest::parser::{ParseContext, ParseOutput, SourceLocation, SourceParser, SourcePattern};
use crate::types::{
    ContentItem, ContentKind, FileAction, OutcomeEvent, Session, Source, META_NATIVE_ID,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use super::chat_log::truncate;

/// Parser for rollout session directories.
pub struct RolloutParser {
    root: Option<PathBuf>,
}

impl RolloutParser {
    /// Create a new parser with the default root path (~/.codex).
    pub fn new() -> Self {
        Self {
            root: dirs::home_dir().map(|h| h.join(".codex")),
        }
    }

    /// Create a parser with a custom root path (for testing and overrides).
    pub fn with_root(root: PathBuf) -> Self {
        Self { root: Some(root) }
    }
}

impl Default for RolloutParser {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct Manifest {
    id: Option<String>,
    started_at: Option<String>,
    ended_at: Option<String>,
    cwd: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct EventRecord {
    kind: Option<String>,
    role: Option<String>,
    text: Option<String>,
    tool: Option<ToolRecord>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ToolRecord {
    name: String,
    input: serde_json::Value,
    ok: Option<bool>,
    output: Option<String>,
}

impl SourceParser for RolloutParser {
    fn source(&self) -> Source {
        Source::Rollout
    }

    fn root_path(&self) -> Option<PathBuf> {
        self.root.clone()
    }

    fn source_patterns(&self) -> Vec<SourcePattern> {
        vec![SourcePattern {
            pattern: "sessions/*".to_string(),
            description: "rollout session directories".to_string(),
        }]
    }

    fn parse(&self, ctx: &ParseContext) -> Result<ParseOutput> {
        let dir = match ctx.location {
            SourceLocation::Path(p) => p,
            SourceLocation::Url(u) => {
                return Err(Error::Parse {
                    source_name: self.source().to_string(),
                    message: format!("rollout parser cannot read URL {}", u),
                })
            }
        };

        let mut output = ParseOutput::default();
        if !dir.is_dir() {
            return Ok(output);
        }

        match parse_session_dir(dir, ctx) {
            Ok(Some((session, warnings))) => {
                output.sessions.push(session);
                output.warnings.extend(warnings);
            }
            Ok(None) => {}
            Err(e) => {
                output
                    .warnings
                    .push(format!("{}: skipped session directory: {}", dir.display(), e));
            }
        }
        Ok(output)
    }
}

fn parse_session_dir(dir: &Path, ctx: &ParseContext) -> Result<Option<(Session, Vec<String>)>> {
    let mut warnings = Vec::new();
    let ingested_at = Utc::now();

    let manifest_path = dir.join("manifest.json");
    let manifest: Manifest = if manifest_path.exists() {
        let content = std::fs::read_to_string(&manifest_path)?;
        match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                warnings.push(format!(
                    "{}: malformed manifest, using defaults: {}",
                    manifest_path.display(),
                    e
                ));
                Manifest::default()
            }
        }
    } else {
        warnings.push(format!("{}: missing manifest.json", dir.display()));
        Manifest::default()
    };

    // Session identity is the directory name; the manifest id, when present,
    // is kept as the native id for dedup.
    let dir_name = dir
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| dir.display().to_string());
    let native_id = manifest.id.clone().unwrap_or_else(|| dir_name.clone());

    let started_at = parse_ts(manifest.started_at.as_deref()).unwrap_or(ingested_at);
    let ended_at = parse_ts(manifest.ended_at.as_deref()).unwrap_or(started_at);

    let mut event_files: Vec<PathBuf> = Vec::new();
    let events_dir = dir.join("events");
    if events_dir.is_dir() {
        for entry in std::fs::read_dir(&events_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                event_files.push(path);
            }
        }
    }
    // Event files are ordered by name (NNN- prefixes)
    event_files.sort();

    let mut title: Option<String> = None;
    let mut transcript = String::new();
    let mut tool_usage: BTreeMap<String, u32> = BTreeMap::new();
    let mut outcomes: Vec<OutcomeEvent> = Vec::new();
    let mut error_snippets: Vec<String> = Vec::new();
    let mut saw_event = false;

    for path in &event_files {
        if ctx.cancelled() {
            warnings.push(format!("{}: parsing cancelled", dir.display()));
            break;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                warnings.push(format!("{}: read error: {}", path.display(), e));
                continue;
            }
        };
        let event: EventRecord = match serde_json::from_str(&content) {
            Ok(e) => e,
            Err(e) => {
                warnings.push(format!("{}: JSON parse error: {}", path.display(), e));
                continue;
            }
        };
        saw_event = true;

        match event.kind.as_deref() {
            Some("message") => {
                let role = event.role.as_deref().unwrap_or("");
                if let Some(text) = &event.text {
                    if title.is_none() && role == "user" {
                        title = text.lines().next().map(|l| truncate(l.trim(), 80).to_string());
                    }
                    if role == "user" || role == "assistant" {
                        transcript.push_str(role);
                        transcript.push_str(": ");
                        transcript.push_str(text);
                        transcript.push('\n');
                    }
                }
            }
            Some("tool") => {
                if let Some(tool) = &event.tool {
                    if !tool.name.is_empty() {
                        *tool_usage.entry(tool.name.clone()).or_insert(0) += 1;
                        record_tool_event(tool, &mut outcomes, &mut error_snippets);
                    }
                }
            }
            Some("signal") => {
                if let Some(name) = &event.text {
                    outcomes.push(OutcomeEvent::SignalEmitted { name: name.clone() });
                }
            }
            _ => {
                // Unknown event kinds are preserved as warnings, not failures.
                warnings.push(format!(
                    "{}: unknown event kind {:?}",
                    path.display(),
                    event.kind
                ));
            }
        }
    }

    if !saw_event && manifest.started_at.is_none() {
        return Ok(None);
    }

    let title = title.unwrap_or_else(|| format!("Session {}", dir_name));
    let excerpt = truncate(transcript.trim(), 200).to_string();

    let mut metadata = serde_json::json!({
        META_NATIVE_ID: native_id,
        "session_dir": dir_name,
    });
    if let Some(cwd) = &manifest.cwd {
        metadata["cwd"] = serde_json::Value::String(cwd.clone());
    }
    if let Some(model) = &manifest.model {
        metadata["model"] = serde_json::Value::String(model.clone());
    }
    if !error_snippets.is_empty() {
        metadata["error_snippets"] = serde_json::json!(error_snippets);
    }

    let item = ContentItem {
        id: String::new(),
        source: Source::Rollout,
        kind: ContentKind::Session,
        title,
        body: transcript,
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
        tool_usage,
        outcomes,
        agent_signals: Vec::new(),
        learnings: Vec::new(),
    };

    Ok(Some((session, warnings)))
}

fn record_tool_event(
    tool: &ToolRecord,
    outcomes: &mut Vec<OutcomeEvent>,
    error_snippets: &mut Vec<String>,
) {
    let path_arg = || {
        tool.input
            .get("file_path")
            .or_else(|| tool.input.get("path"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    match tool.name.as_str() {
        "write_file" | "Write" => {
            if let Some(path) = path_arg() {
                outcomes.push(OutcomeEvent::FileModified {
                    path,
                    action: FileAction::Created,
                });
            }
        }
        "apply_patch" | "Edit" => {
            if let Some(path) = path_arg() {
                outcomes.push(OutcomeEvent::FileModified {
                    path,
                    action: FileAction::Edited,
                });
            }
        }
        "shell" | "Bash" => {
            if let Some(command) = tool.input.get("command").and_then(|v| v.as_str()) {
                outcomes.push(OutcomeEvent::CommandRun {
                    command: command.to_string(),
                    ok: tool.ok.unwrap_or(true),
                });
            }
        }
        _ => {}
    }

    if let Some(output) = &tool.output {
        for line in output.lines() {
            if error_snippets.len() >= 10 {
                break;
            }
            let lower = line.to_lowercase();
            if lower.contains("error") || lower.contains("exception") {
                error_snippets.push(truncate(line.trim(), 160).to_string());
            }
        }
    }
}

fn parse_ts(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
