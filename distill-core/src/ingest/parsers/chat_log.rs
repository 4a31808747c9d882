//! Chat-log session parser
//!
//! Parses newline-delimited JSON session logs laid out as
//! `<root>/projects/<encoded-path>/*.jsonl`, one session per file. Each line
//! is a message envelope with a role, a timestamp, and optional tool-call /
//! tool-result structure.
//!
//! # Error Handling
//!
//! - **Malformed JSON lines**: recorded as a warning, line skipped, parsing
//!   continues.
//! - **Missing fields**: filled via `#[serde(default)]`; a file with no
//!   usable timestamps still yields a session anchored at ingest time.
//! - **Unreadable file**: returns `Err`, which the orchestrator treats as
//!   fatal for this source only.

use crate::error::{Error, Result};
use crate::ingest::parser::{ParseContext, ParseOutput, SourceLocation, SourceParser, SourcePattern};
use crate::types::{
    AgentSignal, ContentItem, ContentKind, FileAction, OutcomeEvent, Session, Source,
    META_NATIVE_ID,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Cap on preserved error snippets per session.
const ERROR_SNIPPET_CAP: usize = 10;

/// Parser for chat-log JSONL session trees.
pub struct ChatLogParser {
    root: Option<PathBuf>,
    include_global: bool,
}

impl ChatLogParser {
    /// Create a new parser with the default root path (~/.claude).
    pub fn new(include_global: bool) -> Self {
        Self {
            root: dirs::home_dir().map(|h| h.join(".claude")),
            include_global,
        }
    }

    /// Create a parser with a custom root path (for testing and overrides).
    pub fn with_root(root: PathBuf, include_global: bool) -> Self {
        Self {
            root: Some(root),
            include_global,
        }
    }
}

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawEnvelope {
    role: Option<String>,
    timestamp: Option<String>,
    session_id: Option<String>,
    cwd: Option<String>,
    git_branch: Option<String>,
    message: Option<RawMessage>,
    tool_call: Option<RawToolCall>,
    tool_result: Option<RawToolResult>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawMessage {
    content: Option<RawContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawContent {
    Text(String),
    Blocks(Vec<RawBlock>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawBlock {
    Text { text: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawToolCall {
    name: String,
    input: serde_json::Value,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawToolResult {
    name: String,
    is_error: bool,
    output: Option<String>,
}

impl SourceParser for ChatLogParser {
    fn source(&self) -> Source {
        Source::ChatLog
    }

    fn root_path(&self) -> Option<PathBuf> {
        self.root.clone()
    }

    fn source_patterns(&self) -> Vec<SourcePattern> {
        let mut patterns = vec![SourcePattern {
            pattern: "projects/*/*.jsonl".to_string(),
            description: "per-project chat-log sessions".to_string(),
        }];
        if self.include_global {
            patterns.push(SourcePattern {
                pattern: "sessions/*.jsonl".to_string(),
                description: "user-wide chat-log sessions".to_string(),
            });
        }
        patterns
    }

    fn parse(&self, ctx: &ParseContext) -> Result<ParseOutput> {
        let path = match ctx.location {
            SourceLocation::Path(p) => p,
            SourceLocation::Url(u) => {
                return Err(Error::Parse {
                    source_name: self.source().to_string(),
                    message: format!("chat-log parser cannot read URL {}", u),
                })
            }
        };

        let mut output = ParseOutput::default();
        match parse_session_file(path, ctx) {
            Ok(Some((session, warnings))) => {
                output.sessions.push(session);
                output.warnings.extend(warnings);
            }
            Ok(None) => {}
            Err(e) => {
                // Whole-file failure is soft: skip the file, emit one diagnostic.
                output
                    .warnings
                    .push(format!("{}: skipped file: {}", path.display(), e));
            }
        }
        Ok(output)
    }
}

/// Parse one JSONL file into a session. Returns `None` for empty files.
fn parse_session_file(
    path: &Path,
    ctx: &ParseContext,
) -> Result<Option<(Session, Vec<String>)>> {
    let file = File::open(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open {}: {}", path.display(), e),
        ))
    })?;
    let reader = BufReader::new(file);

    let mut warnings = Vec::new();
    let mut line_number = 0usize;

    let ingested_at = Utc::now();
    let mut session_id: Option<String> = None;
    let mut cwd: Option<String> = None;
    let mut git_branch: Option<String> = None;
    let mut first_timestamp: Option<DateTime<Utc>> = None;
    let mut last_timestamp: Option<DateTime<Utc>> = None;

    let mut title: Option<String> = None;
    let mut transcript = String::new();
    let mut tool_usage: BTreeMap<String, u32> = BTreeMap::new();
    let mut outcomes: Vec<OutcomeEvent> = Vec::new();
    let mut error_snippets: Vec<String> = Vec::new();
    // Last Bash-style command seen, awaiting its result record
    let mut pending_command: Option<String> = None;
    let mut saw_record = false;

    for line_result in reader.lines() {
        if ctx.cancelled() {
            warnings.push(format!("{}: parsing cancelled", path.display()));
            break;
        }
        line_number += 1;

        let line = match line_result {
            Ok(l) => l,
            Err(e) => {
                warnings.push(format!("{}: line {}: read error: {}", path.display(), line_number, e));
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let record: RawEnvelope = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warnings.push(format!(
                    "{}: line {}: JSON parse error: {}",
                    path.display(),
                    line_number,
                    e
                ));
                continue;
            }
        };
        saw_record = true;

        if session_id.is_none() {
            session_id = record.session_id.clone();
        }
        if cwd.is_none() {
            cwd = record.cwd.clone();
        }
        if git_branch.is_none() {
            git_branch = record.git_branch.clone();
        }

        if let Some(ts) = record
            .timestamp
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
        {
            if first_timestamp.is_none() {
                first_timestamp = Some(ts);
            }
            last_timestamp = Some(ts);
        }

        let role = record.role.as_deref().unwrap_or("");
        if let Some(text) = message_text(&record.message) {
            if title.is_none() && role == "user" {
                title = text.lines().next().map(|l| truncate(l.trim(), 80).to_string());
            }
            if role == "user" || role == "assistant" {
                transcript.push_str(role);
                transcript.push_str(": ");
                transcript.push_str(&text);
                transcript.push('\n');
            }
        }

        if let Some(call) = &record.tool_call {
            if !call.name.is_empty() {
                *tool_usage.entry(call.name.clone()).or_insert(0) += 1;
                record_tool_call(call, &mut outcomes, &mut pending_command);
            }
        }

        if let Some(result) = &record.tool_result {
            record_tool_result(result, &mut outcomes, &mut pending_command, &mut error_snippets);
        }
    }

    if !saw_record {
        return Ok(None);
    }

    let native_id = session_id.unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string())
    });

    let started_at = first_timestamp.unwrap_or_else(|| {
        warnings.push(format!("{}: no timestamps; anchoring at ingest time", path.display()));
        ingested_at
    });
    let ended_at = last_timestamp.unwrap_or(started_at);

    let title = title.unwrap_or_else(|| format!("Session {}", native_id));
    let excerpt = truncate(transcript.trim(), 200).to_string();

    let mut metadata = serde_json::json!({
        META_NATIVE_ID: native_id,
    });
    if let Some(cwd) = &cwd {
        metadata["cwd"] = serde_json::Value::String(cwd.clone());
    }
    if let Some(branch) = &git_branch {
        metadata["git_branch"] = serde_json::Value::String(branch.clone());
    }
    if !error_snippets.is_empty() {
        metadata["error_snippets"] = serde_json::json!(error_snippets);
    }

    let item = ContentItem {
        id: String::new(),
        source: Source::ChatLog,
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
        agent_signals: Vec::<AgentSignal>::new(),
        learnings: Vec::new(),
    };

    Ok(Some((session, warnings)))
}

fn message_text(message: &Option<RawMessage>) -> Option<String> {
    match message.as_ref()?.content.as_ref()? {
        RawContent::Text(s) => Some(s.clone()),
        RawContent::Blocks(blocks) => {
            let text: Vec<&str> = blocks
                .iter()
                .filter_map(|b| match b {
                    RawBlock::Text { text } => Some(text.as_str()),
                    RawBlock::Unknown => None,
                })
                .collect();
            if text.is_empty() {
                None
            } else {
                Some(text.join("\n"))
            }
        }
    }
}

fn record_tool_call(
    call: &RawToolCall,
    outcomes: &mut Vec<OutcomeEvent>,
    pending_command: &mut Option<String>,
) {
    let path_arg = || {
        call.input
            .get("file_path")
            .or_else(|| call.input.get("path"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    match call.name.as_str() {
        "Write" => {
            if let Some(path) = path_arg() {
                outcomes.push(OutcomeEvent::FileModified {
                    path,
                    action: FileAction::Created,
                });
            }
        }
        "Edit" | "MultiEdit" => {
            if let Some(path) = path_arg() {
                outcomes.push(OutcomeEvent::FileModified {
                    path,
                    action: FileAction::Edited,
                });
            }
        }
        "Bash" => {
            *pending_command = call
                .input
                .get("command")
                .and_then(|v| v.as_str())
                .map(str::to_string);
        }
        _ => {}
    }
}

fn record_tool_result(
    result: &RawToolResult,
    outcomes: &mut Vec<OutcomeEvent>,
    pending_command: &mut Option<String>,
    error_snippets: &mut Vec<String>,
) {
    if result.name == "Bash" {
        if let Some(command) = pending_command.take() {
            outcomes.push(OutcomeEvent::CommandRun {
                command,
                ok: !result.is_error,
            });
        }
    }

    if let Some(output) = &result.output {
        for line in output.lines() {
            if error_snippets.len() >= ERROR_SNIPPET_CAP {
                break;
            }
            let lower = line.to_lowercase();
            if lower.contains("error") || lower.contains("exception") {
                error_snippets.push(truncate(line.trim(), 160).to_string());
            }
        }
    }
}

/// Truncate at a UTF-8 boundary at or below `max` bytes.
pub(crate) fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    fn parse_fixture(content: &str) -> (ParseOutput, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let sessions = dir.path().join("projects").join("p1");
        std::fs::create_dir_all(&sessions).unwrap();
        let file = sessions.join("s1.jsonl");
        std::fs::write(&file, content).unwrap();

        let parser = ChatLogParser::with_root(dir.path().to_path_buf(), false);
        let cancel = AtomicBool::new(false);
        let location = SourceLocation::Path(file);
        let ctx = ParseContext {
            location: &location,
            since: Utc::now() - chrono::Duration::days(7),
            cancel: &cancel,
        };
        (parser.parse(&ctx).unwrap(), dir)
    }

    #[test]
    fn parses_basic_session() {
        let content = concat!(
            r#"{"role":"user","timestamp":"2026-02-08T09:00:00Z","sessionId":"abc","cwd":"/home/dev/alpha","message":{"content":"Fix the login bug"}}"#,
            "\n",
            r#"{"role":"assistant","timestamp":"2026-02-08T09:05:00Z","message":{"content":[{"type":"text","text":"Looking into it."}]}}"#,
            "\n",
            r#"{"role":"assistant","timestamp":"2026-02-08T09:45:00Z","toolCall":{"name":"Edit","input":{"file_path":"/home/dev/alpha/src/login.rs"}}}"#,
            "\n",
        );
        let (output, _dir) = parse_fixture(content);

        assert_eq!(output.sessions.len(), 1);
        let session = &output.sessions[0];
        assert_eq!(session.item.native_id(), Some("abc"));
        assert_eq!(session.item.title, "Fix the login bug");
        assert_eq!(
            (session.ended_at - session.started_at).num_minutes(),
            45
        );
        assert_eq!(session.tool_usage.get("Edit"), Some(&1));
        assert_eq!(
            session.outcomes[0],
            OutcomeEvent::FileModified {
                path: "/home/dev/alpha/src/login.rs".to_string(),
                action: FileAction::Edited,
            }
        );
    }

    #[test]
    fn malformed_lines_become_warnings() {
        let content = concat!(
            r#"{"role":"user","timestamp":"2026-02-08T09:00:00Z","message":{"content":"hello"}}"#,
            "\n",
            "this is not json\n",
            r#"{"role":"assistant","timestamp":"2026-02-08T09:01:00Z","message":{"content":"hi"}}"#,
            "\n",
        );
        let (output, _dir) = parse_fixture(content);

        assert_eq!(output.sessions.len(), 1);
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].contains("JSON parse error"));
    }

    #[test]
    fn empty_file_yields_nothing() {
        let (output, _dir) = parse_fixture("");
        assert!(output.sessions.is_empty());
    }

    #[test]
    fn command_results_pair_with_calls() {
        let content = concat!(
            r#"{"role":"assistant","timestamp":"2026-02-08T09:00:00Z","toolCall":{"name":"Bash","input":{"command":"cargo test"}}}"#,
            "\n",
            r#"{"role":"user","timestamp":"2026-02-08T09:01:00Z","toolResult":{"name":"Bash","isError":true,"output":"error[E0308]: mismatched types"}}"#,
            "\n",
        );
        let (output, _dir) = parse_fixture(content);

        let session = &output.sessions[0];
        assert_eq!(
            session.outcomes[0],
            OutcomeEvent::CommandRun {
                command: "cargo test".to_string(),
                ok: false,
            }
        );
        let snippets = session.item.metadata["error_snippets"].as_array().unwrap();
        assert_eq!(snippets.len(), 1);
    }

    #[test]
    fn ids_are_stable_across_reparse() {
        let content = concat!(
            r#"{"role":"user","timestamp":"2026-02-08T09:00:00Z","sessionId":"abc","message":{"content":"hi"}}"#,
            "\n",
        );
        let (first, _d1) = parse_fixture(content);
        let (second, _d2) = parse_fixture(content);
        assert_eq!(
            first.sessions[0].item.native_id(),
            second.sessions[0].item.native_id()
        );
    }
}
