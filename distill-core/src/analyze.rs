//! Session analyzer
//!
//! A pure, deterministic pass over parsed sessions that fills in derived
//! fields: wall-clock duration, activity tags, and project attribution.
//! The analyzer never mutates the raw body and never touches persisted
//! state; identical input always produces identical output.

use crate::config::ProjectSpec;
use crate::types::{FileAction, OutcomeEvent, Session, UNASSIGNED_PROJECT};
use std::path::Path;

/// Extensions treated as documentation for tagging purposes.
const DOC_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "rst", "adoc"];

/// Commands recognized as test runners.
const TEST_RUNNERS: &[&str] = &[
    "cargo test",
    "pytest",
    "npm test",
    "npm run test",
    "go test",
    "jest",
    "rspec",
    "mvn test",
];

/// Fill in every derived field on a session.
pub fn analyze_session(session: &mut Session, projects: &[ProjectSpec]) {
    analyze_duration(session);
    analyze_tags(session);
    analyze_project(session, projects);
}

/// Recompute the duration from the recorded boundaries. A negative span
/// means the source timestamps were unusable, which is recorded as unknown
/// rather than clamped.
fn analyze_duration(session: &mut Session) {
    let seconds = (session.ended_at - session.started_at).num_seconds();
    if seconds >= 0 {
        session.duration_seconds = Some(seconds);
    } else {
        session.duration_seconds = None;
        session.item.metadata["duration_unknown"] = serde_json::Value::Bool(true);
    }
}

fn analyze_tags(session: &mut Session) {
    let mut tags = std::mem::take(&mut session.item.tags);
    tags.insert("ai-session".to_string());
    tags.insert(session.item.source.as_str().to_string());

    if saw_errors(session) {
        tags.insert("debugging".to_string());
    }
    if ran_tests(session) {
        tags.insert("testing".to_string());
    }

    let modified: Vec<(&str, FileAction)> = session
        .outcomes
        .iter()
        .filter_map(|o| match o {
            OutcomeEvent::FileModified { path, action } => Some((path.as_str(), *action)),
            _ => None,
        })
        .collect();

    if modified.iter().any(|(_, action)| *action == FileAction::Created) {
        tags.insert("feature".to_string());
    }
    if !modified.is_empty() && modified.iter().all(|(path, _)| is_doc_path(path)) {
        tags.insert("documentation".to_string());
    }

    session.item.tags = tags;
}

fn saw_errors(session: &Session) -> bool {
    let snippets = session
        .item
        .metadata
        .get("error_snippets")
        .and_then(|v| v.as_array())
        .map(|a| !a.is_empty())
        .unwrap_or(false);
    snippets
        || session
            .outcomes
            .iter()
            .any(|o| matches!(o, OutcomeEvent::CommandRun { ok: false, .. }))
}

fn ran_tests(session: &Session) -> bool {
    session.outcomes.iter().any(|o| match o {
        OutcomeEvent::CommandRun { command, .. } => {
            TEST_RUNNERS.iter().any(|runner| command.contains(runner))
        }
        _ => false,
    })
}

fn is_doc_path(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| DOC_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Resolve the project this session belongs to.
///
/// Priority: an explicit attribution from the parser, then the project whose
/// configured root is the longest prefix of the modified files, then the
/// basename of the working directory, then unassigned.
fn analyze_project(session: &mut Session, projects: &[ProjectSpec]) {
    if session.item.project.is_some() {
        return;
    }

    if let Some(name) = project_by_roots(session, projects) {
        session.item.project = Some(name);
        return;
    }

    let cwd_basename = session
        .item
        .metadata
        .get("cwd")
        .and_then(|v| v.as_str())
        .and_then(|cwd| {
            Path::new(cwd)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
        })
        .filter(|name| !name.is_empty());

    session.item.project = Some(cwd_basename.unwrap_or_else(|| UNASSIGNED_PROJECT.to_string()));
}

fn project_by_roots(session: &Session, projects: &[ProjectSpec]) -> Option<String> {
    let modified: Vec<&str> = session
        .outcomes
        .iter()
        .filter_map(|o| match o {
            OutcomeEvent::FileModified { path, .. } => Some(path.as_str()),
            _ => None,
        })
        .collect();
    if modified.is_empty() {
        return None;
    }

    // Longest root that is a prefix of every modified file wins.
    let mut best: Option<(usize, &ProjectSpec)> = None;
    for project in projects {
        for root in &project.roots {
            let root_str = root.to_string_lossy();
            let all_match = modified
                .iter()
                .all(|path| Path::new(path).starts_with(root.as_path()));
            if all_match {
                let len = root_str.len();
                if best.map(|(best_len, _)| len > best_len).unwrap_or(true) {
                    best = Some((len, project));
                }
            }
        }
    }
    best.map(|(_, project)| project.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentItem, ContentKind, Source};
    use chrono::{Duration, Utc};
    use std::collections::{BTreeMap, BTreeSet};
    use std::path::PathBuf;

    fn session_with(outcomes: Vec<OutcomeEvent>, metadata: serde_json::Value) -> Session {
        let now = Utc::now();
        Session {
            item: ContentItem {
                id: "chat-log-0000".to_string(),
                source: Source::ChatLog,
                kind: ContentKind::Session,
                title: "t".to_string(),
                body: String::new(),
                excerpt: String::new(),
                url: None,
                author: None,
                site_name: None,
                published_at: None,
                ingested_at: now,
                tags: BTreeSet::new(),
                topics: BTreeSet::new(),
                project: None,
                metadata,
            },
            started_at: now,
            ended_at: now + Duration::minutes(45),
            duration_seconds: None,
            tool_usage: BTreeMap::new(),
            outcomes,
            agent_signals: vec![],
            learnings: vec![],
        }
    }

    fn project(name: &str, root: &str) -> ProjectSpec {
        ProjectSpec {
            name: name.to_string(),
            description: String::new(),
            url: None,
            tags: vec![],
            roots: vec![PathBuf::from(root)],
        }
    }

    #[test]
    fn duration_is_recomputed() {
        let mut session = session_with(vec![], serde_json::json!({}));
        analyze_session(&mut session, &[]);
        assert_eq!(session.duration_seconds, Some(2700));
    }

    #[test]
    fn negative_duration_is_unknown() {
        let mut session = session_with(vec![], serde_json::json!({}));
        session.ended_at = session.started_at - Duration::minutes(5);
        analyze_session(&mut session, &[]);
        assert_eq!(session.duration_seconds, None);
        assert_eq!(session.item.metadata["duration_unknown"], true);
    }

    #[test]
    fn base_tags_always_present() {
        let mut session = session_with(vec![], serde_json::json!({}));
        analyze_session(&mut session, &[]);
        assert!(session.item.tags.contains("ai-session"));
        assert!(session.item.tags.contains("chat-log"));
    }

    #[test]
    fn debugging_tag_from_error_output() {
        let mut session = session_with(
            vec![],
            serde_json::json!({ "error_snippets": ["error[E0308]"] }),
        );
        analyze_session(&mut session, &[]);
        assert!(session.item.tags.contains("debugging"));
    }

    #[test]
    fn testing_tag_from_test_runner() {
        let mut session = session_with(
            vec![OutcomeEvent::CommandRun {
                command: "cargo test --workspace".to_string(),
                ok: true,
            }],
            serde_json::json!({}),
        );
        analyze_session(&mut session, &[]);
        assert!(session.item.tags.contains("testing"));
        assert!(!session.item.tags.contains("debugging"));
    }

    #[test]
    fn feature_and_documentation_tags() {
        let mut session = session_with(
            vec![OutcomeEvent::FileModified {
                path: "/p/src/new.rs".to_string(),
                action: FileAction::Created,
            }],
            serde_json::json!({}),
        );
        analyze_session(&mut session, &[]);
        assert!(session.item.tags.contains("feature"));
        assert!(!session.item.tags.contains("documentation"));

        let mut docs_only = session_with(
            vec![OutcomeEvent::FileModified {
                path: "/p/README.md".to_string(),
                action: FileAction::Edited,
            }],
            serde_json::json!({}),
        );
        analyze_session(&mut docs_only, &[]);
        assert!(docs_only.item.tags.contains("documentation"));
    }

    #[test]
    fn project_from_longest_root_prefix() {
        let mut session = session_with(
            vec![OutcomeEvent::FileModified {
                path: "/home/dev/alpha/sub/src/lib.rs".to_string(),
                action: FileAction::Edited,
            }],
            serde_json::json!({}),
        );
        let projects = vec![
            project("alpha", "/home/dev/alpha"),
            project("alpha-sub", "/home/dev/alpha/sub"),
        ];
        analyze_session(&mut session, &projects);
        assert_eq!(session.item.project.as_deref(), Some("alpha-sub"));
    }

    #[test]
    fn project_falls_back_to_cwd_basename() {
        let mut session = session_with(vec![], serde_json::json!({ "cwd": "/home/dev/beta" }));
        analyze_session(&mut session, &[]);
        assert_eq!(session.item.project.as_deref(), Some("beta"));
    }

    #[test]
    fn project_unassigned_without_hints() {
        let mut session = session_with(vec![], serde_json::json!({}));
        analyze_session(&mut session, &[]);
        assert_eq!(session.item.project.as_deref(), Some(UNASSIGNED_PROJECT));
    }

    #[test]
    fn deterministic_output() {
        let make = || {
            let mut s = session_with(
                vec![OutcomeEvent::CommandRun {
                    command: "pytest -q".to_string(),
                    ok: false,
                }],
                serde_json::json!({ "cwd": "/w/gamma" }),
            );
            analyze_session(&mut s, &[]);
            s
        };
        let a = make();
        let b = make();
        assert_eq!(a.item.tags, b.item.tags);
        assert_eq!(a.item.project, b.item.project);
        assert_eq!(a.duration_seconds, b.duration_seconds);
    }
}
