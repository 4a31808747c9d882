//! Blog synthesizer
//!
//! Turns a weekly or thematic context into one post, enforcing cross-post
//! non-repetition against blog memory: an avoid-list built from recent
//! posts goes into the prompt, the generated post's own key points are
//! extracted back out, and excessive overlap triggers one corrected
//! re-prompt before the post is accepted with an annotation.

mod context;

pub use context::{build_weekly_context, thematic_candidates, ThematicContext, WeeklyContext};

use crate::config::{BlogConfig, LlmConfig};
use crate::error::Result;
use crate::llm::{invoke_with_retry, LlmWorker};
use crate::store::BlogMemory;
use crate::types::{BlogPost, EditorialNote, PostType};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;

const WEEKLY_PROMPT: &str = "\
You are writing a weekly engineering blog post in markdown.

Synthesize the week's journal excerpts below into one long-form post with
a clear arc. Use `##` section headings. Ground every claim in the week's
work; do not invent examples. Prefer fresh angles over ones already
covered in earlier posts.
";

const THEMATIC_PROMPT: &str = "\
You are writing a thematic engineering blog post in markdown.

The theme below kept recurring across several days of work. Synthesize the
excerpts into one focused post about that theme, with `##` section
headings, concrete moments from the journals, and a closing takeaway.
Prefer fresh angles over ones already covered in earlier posts.
";

/// Cap on extracted examples per post.
const EXAMPLES_CAP: usize = 10;

/// Annotation appended when overlap stays above threshold after re-prompt.
const OVERLAP_ANNOTATION: &str = "<!-- overlap with recent posts exceeded threshold -->";

/// Outcome of one blog synthesis.
#[derive(Debug)]
pub struct BlogDraft {
    pub post: BlogPost,
    pub diagnostics: Vec<String>,
}

/// Drives the LLM worker for one blog post.
pub struct BlogSynthesizer<'a> {
    worker: &'a dyn LlmWorker,
    blog: &'a BlogConfig,
    llm: &'a LlmConfig,
}

impl<'a> BlogSynthesizer<'a> {
    pub fn new(worker: &'a dyn LlmWorker, blog: &'a BlogConfig, llm: &'a LlmConfig) -> Self {
        Self { worker, blog, llm }
    }

    /// Generate the weekly post for a prepared context.
    pub fn synthesize_weekly(
        &self,
        ctx: &WeeklyContext,
        blog_memory: &BlogMemory,
        notes: &[EditorialNote],
        cancel: &AtomicBool,
    ) -> Result<BlogDraft> {
        let mut prompt = String::from(WEEKLY_PROMPT);
        prompt.push_str(&format!(
            "\nTarget length: about {} words.\nWeek: {}\nProjects: {}\n",
            self.blog.target_word_count,
            ctx.week,
            ctx.projects.join(", ")
        ));
        if !ctx.themes.is_empty() {
            prompt.push_str(&format!("Themes: {}\n", ctx.themes.join(", ")));
        }
        if !ctx.recurring_topics.is_empty() {
            prompt.push_str(&format!(
                "Recurring topics: {}\n",
                ctx.recurring_topics.join(", ")
            ));
        }
        push_list(&mut prompt, "Decisions this week", &ctx.decisions);
        push_list(&mut prompt, "Open questions", &ctx.open_questions);
        push_notes(&mut prompt, notes);
        push_excerpts(&mut prompt, &ctx.excerpts);

        let slug = format!("weekly-{}", ctx.week);
        self.generate(
            prompt,
            slug,
            PostType::Weekly,
            ctx.date,
            ctx.themes.clone(),
            ctx.projects.clone(),
            ctx.journal_dates.clone(),
            blog_memory,
            cancel,
        )
    }

    /// Generate a thematic post for a prepared context.
    ///
    /// `slug_taken` reports slugs already owned by other posts; collisions
    /// get a numeric suffix so slugs stay unique.
    pub fn synthesize_thematic(
        &self,
        ctx: &ThematicContext,
        blog_memory: &BlogMemory,
        notes: &[EditorialNote],
        slug_taken: &dyn Fn(&str) -> bool,
        cancel: &AtomicBool,
    ) -> Result<BlogDraft> {
        let mut prompt = String::from(THEMATIC_PROMPT);
        prompt.push_str(&format!(
            "\nTarget length: about {} words.\nTheme: {}\nSeen on {} days.\n",
            self.blog.target_word_count,
            ctx.theme,
            ctx.journal_dates.len()
        ));
        if !ctx.entities.is_empty() {
            let names: Vec<&str> = ctx.entities.iter().map(|e| e.name.as_str()).collect();
            prompt.push_str(&format!("Involved: {}\n", names.join(", ")));
        }
        push_notes(&mut prompt, notes);
        push_excerpts(&mut prompt, &ctx.excerpts);

        let slug = unique_slug(&slug::slugify(&ctx.theme), slug_taken);
        self.generate(
            prompt,
            slug,
            PostType::Thematic,
            ctx.date,
            vec![ctx.theme.clone()],
            vec![],
            ctx.journal_dates.clone(),
            blog_memory,
            cancel,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn generate(
        &self,
        base_prompt: String,
        slug: String,
        post_type: PostType,
        date: chrono::NaiveDate,
        themes: Vec<String>,
        projects: Vec<String>,
        source_dates: Vec<chrono::NaiveDate>,
        blog_memory: &BlogMemory,
        cancel: &AtomicBool,
    ) -> Result<BlogDraft> {
        let mut diagnostics = Vec::new();
        let avoid = blog_memory.avoid_list(self.blog.avoid_list_posts);

        let mut prompt = base_prompt.clone();
        if !avoid.is_empty() {
            prompt.push_str("\n## Already covered in earlier posts (avoid repeating)\n");
            for item in &avoid {
                prompt.push_str(&format!("- {}\n", item));
            }
        }

        let raw = invoke_with_retry(self.worker, &prompt, self.llm.retries, cancel)?;
        let mut body = strip_chrome(&raw);
        let mut key_points = extract_key_points(&body);
        let mut examples = extract_examples(&body);

        let mut overlapping = overlap_with(&key_points, &avoid);
        if over_threshold(overlapping.len(), key_points.len(), self.blog.overlap_threshold) {
            tracing::info!(
                slug = %slug,
                overlap = overlapping.len(),
                total = key_points.len(),
                "Post overlaps recent posts, re-prompting"
            );
            let mut correction = base_prompt;
            correction.push_str("\n## Already covered (rework or drop these specifically)\n");
            for item in &overlapping {
                correction.push_str(&format!("- {}\n", item));
            }
            correction.push_str("\nPrevious draft:\n");
            correction.push_str(&body);

            let retry = invoke_with_retry(self.worker, &correction, self.llm.retries, cancel)?;
            body = strip_chrome(&retry);
            key_points = extract_key_points(&body);
            examples = extract_examples(&body);
            overlapping = overlap_with(&key_points, &avoid);

            if over_threshold(overlapping.len(), key_points.len(), self.blog.overlap_threshold) {
                diagnostics.push(format!(
                    "post {} still overlaps {} of {} key points after re-prompt",
                    slug,
                    overlapping.len(),
                    key_points.len()
                ));
                body.push_str("\n\n");
                body.push_str(OVERLAP_ANNOTATION);
            }
        }

        if self.blog.include_diagrams {
            if let Some(diagram) = build_diagram(&body) {
                body = insert_after_first_section(&body, &diagram);
            }
        }

        let title = body
            .lines()
            .find(|l| l.starts_with("# "))
            .map(|l| l.trim_start_matches("# ").trim().to_string())
            .unwrap_or_else(|| slug.clone());

        let post = BlogPost {
            slug,
            post_type,
            date,
            title,
            themes,
            projects,
            source_dates,
            key_points,
            examples_used: examples,
            platforms_published: BTreeSet::new(),
            body_markdown: body,
        };

        Ok(BlogDraft { post, diagnostics })
    }
}

fn push_list(prompt: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    prompt.push_str(&format!("\n## {}\n", heading));
    for item in items {
        prompt.push_str(&format!("- {}\n", item));
    }
}

fn push_notes(prompt: &mut String, notes: &[EditorialNote]) {
    if notes.is_empty() {
        return;
    }
    prompt.push_str("\n## Editorial guidance\n");
    for note in notes {
        prompt.push_str(&format!("- {}\n", note.text));
    }
}

fn push_excerpts(prompt: &mut String, excerpts: &[String]) {
    prompt.push_str("\n## Journal excerpts\n");
    for excerpt in excerpts {
        prompt.push_str("\n---\n");
        prompt.push_str(excerpt);
        prompt.push('\n');
    }
}

fn strip_chrome(text: &str) -> String {
    match text.lines().position(|l| l.starts_with("# ")) {
        Some(index) => text
            .lines()
            .skip(index)
            .collect::<Vec<_>>()
            .join("\n")
            .trim_end()
            .to_string(),
        None => text.trim().to_string(),
    }
}

/// First sentence of each non-title heading section.
fn extract_key_points(body: &str) -> Vec<String> {
    let mut points = Vec::new();
    let mut in_section = false;
    for line in body.lines() {
        if line.starts_with("## ") {
            in_section = true;
            continue;
        }
        if line.starts_with('#') {
            in_section = false;
            continue;
        }
        if in_section {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with("```") {
                continue;
            }
            let sentence = first_sentence(trimmed);
            if !sentence.is_empty() {
                points.push(sentence);
            }
            in_section = false;
        }
    }
    points
}

fn first_sentence(text: &str) -> String {
    match text.find(". ") {
        Some(index) => text[..=index].trim().to_string(),
        None => text.trim_end().to_string(),
    }
}

/// Short quoted or backticked snippets used as concrete examples.
fn extract_examples(body: &str) -> Vec<String> {
    let quoted = Regex::new(r#""([^"\n]{4,60})""#).expect("valid regex");
    let ticked = Regex::new(r"`([^`\n]{4,60})`").expect("valid regex");

    let mut seen = BTreeSet::new();
    let mut examples = Vec::new();
    for capture in quoted.captures_iter(body).chain(ticked.captures_iter(body)) {
        let snippet = capture[1].trim().to_string();
        if seen.insert(snippet.clone()) {
            examples.push(snippet);
            if examples.len() >= EXAMPLES_CAP {
                break;
            }
        }
    }
    examples
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_string()
}

fn overlap_with(candidates: &[String], avoid: &[String]) -> Vec<String> {
    let avoid_set: BTreeSet<String> = avoid.iter().map(|a| normalize(a)).collect();
    candidates
        .iter()
        .filter(|c| avoid_set.contains(&normalize(c)))
        .cloned()
        .collect()
}

fn over_threshold(overlapping: usize, total: usize, threshold: f64) -> bool {
    total > 0 && (overlapping as f64 / total as f64) > threshold
}

/// Append a numeric suffix until the slug is free.
fn unique_slug(base: &str, taken: &dyn Fn(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Build a mermaid block from structural cues in the text: `A -> B` arrow
/// chains, or a run of numbered steps. Returns `None` without cues.
fn build_diagram(body: &str) -> Option<String> {
    let arrow = Regex::new(r"(?m)^\s*([A-Za-z][\w .-]{1,30})\s*(?:->|→)\s*([A-Za-z][\w .-]{1,30})\s*$")
        .expect("valid regex");
    let edges: Vec<(String, String)> = arrow
        .captures_iter(body)
        .map(|c| (c[1].trim().to_string(), c[2].trim().to_string()))
        .collect();

    if !edges.is_empty() {
        let mut diagram = String::from("```mermaid\nflowchart LR\n");
        for (from, to) in edges {
            diagram.push_str(&format!(
                "    {}[\"{}\"] --> {}[\"{}\"]\n",
                node_id(&from),
                from,
                node_id(&to),
                to
            ));
        }
        diagram.push_str("```");
        return Some(diagram);
    }

    let step = Regex::new(r"(?m)^\s*\d+\.\s+(.{3,60})$").expect("valid regex");
    let steps: Vec<String> = step
        .captures_iter(body)
        .map(|c| c[1].trim().trim_end_matches('.').to_string())
        .collect();
    if steps.len() >= 3 {
        let mut diagram = String::from("```mermaid\nflowchart TD\n");
        for pair in steps.windows(2) {
            diagram.push_str(&format!(
                "    {}[\"{}\"] --> {}[\"{}\"]\n",
                node_id(&pair[0]),
                pair[0],
                node_id(&pair[1]),
                pair[1]
            ));
        }
        diagram.push_str("```");
        return Some(diagram);
    }

    None
}

fn node_id(label: &str) -> String {
    let id = slug::slugify(label).replace('-', "_");
    if id.is_empty() {
        "n".to_string()
    } else {
        id
    }
}

/// Insert a block after the first `##` section heading's paragraph, falling
/// back to appending.
fn insert_after_first_section(body: &str, block: &str) -> String {
    let lines: Vec<&str> = body.lines().collect();
    if let Some(index) = lines.iter().position(|l| l.starts_with("## ")) {
        let mut out: Vec<String> = lines[..=index].iter().map(|l| l.to_string()).collect();
        out.push(String::new());
        out.push(block.to_string());
        out.extend(lines[index + 1..].iter().map(|l| l.to_string()));
        out.join("\n")
    } else {
        format!("{}\n\n{}", body, block)
    }
}
