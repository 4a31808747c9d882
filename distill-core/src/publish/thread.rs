//! Thread-format dialect
//!
//! Short segmented posts: markdown structure is flattened to plain prose,
//! split into numbered segments that each fit a 280-character budget.

use crate::error::Result;
use crate::types::BlogPost;

use super::{Publisher, RenderedPost};

const SEGMENT_BUDGET: usize = 280;
/// Room reserved for the "(n/m) " prefix.
const PREFIX_RESERVE: usize = 10;

pub struct ThreadPublisher;

impl Publisher for ThreadPublisher {
    fn platform(&self) -> &'static str {
        "thread"
    }

    fn render(&self, post: &BlogPost) -> Result<RenderedPost> {
        let prose = flatten(&post.body_markdown);
        let mut segments = segment(&prose, SEGMENT_BUDGET - PREFIX_RESERVE);
        if segments.is_empty() {
            segments.push(post.title.clone());
        }

        let total = segments.len();
        let numbered: Vec<String> = segments
            .iter()
            .enumerate()
            .map(|(i, s)| format!("({}/{}) {}", i + 1, total, s))
            .collect();

        Ok(RenderedPost {
            platform: self.platform().to_string(),
            slug: post.slug.clone(),
            content: numbered.join("\n\n---\n\n"),
            payload: Some(serde_json::json!({ "segments": numbered })),
        })
    }
}

/// Strip markdown structure down to sentences.
fn flatten(markdown: &str) -> String {
    let mut out = String::new();
    let mut in_code = false;
    for line in markdown.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            in_code = !in_code;
            continue;
        }
        if in_code || trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("<!--")
        {
            continue;
        }
        let cleaned = trimmed.trim_start_matches("- ").replace("**", "");
        out.push_str(&cleaned);
        out.push(' ');
    }
    out.trim().to_string()
}

/// Greedy sentence packing under the per-segment budget. A sentence longer
/// than the budget is split on word boundaries.
fn segment(prose: &str, budget: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(prose) {
        for chunk in split_to_budget(&sentence, budget) {
            if current.is_empty() {
                current = chunk;
            } else if current.len() + 1 + chunk.len() <= budget {
                current.push(' ');
                current.push_str(&chunk);
            } else {
                segments.push(std::mem::take(&mut current));
                current = chunk;
            }
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn split_sentences(prose: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for word in prose.split_whitespace() {
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
        if word.ends_with('.') || word.ends_with('!') || word.ends_with('?') {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        sentences.push(current);
    }
    sentences
}

fn split_to_budget(sentence: &str, budget: usize) -> Vec<String> {
    if sentence.len() <= budget {
        return vec![sentence.to_string()];
    }
    let mut chunks = Vec::new();
    let mut current = String::new();
    for word in sentence.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > budget {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::tests::post;

    #[test]
    fn segments_are_numbered_and_bounded() {
        let mut long_post = post();
        long_post.body_markdown = format!(
            "# Title\n\n{}",
            "This sentence repeats to pad the thread out well past one segment. ".repeat(20)
        );
        let rendered = ThreadPublisher.render(&long_post).unwrap();

        let segments: Vec<&str> = rendered.content.split("\n\n---\n\n").collect();
        assert!(segments.len() > 1);
        assert!(segments[0].starts_with("(1/"));
        assert!(segments.iter().all(|s| s.len() <= SEGMENT_BUDGET));
    }

    #[test]
    fn headings_and_code_are_dropped() {
        let rendered = ThreadPublisher.render(&post()).unwrap();
        assert!(!rendered.content.contains('#'));
        assert!(rendered.content.contains("It held up."));
    }
}
