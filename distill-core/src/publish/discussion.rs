//! Discussion-post dialect
//!
//! Title plus markdown body, closed with an open question pulled from the
//! post to start the thread.

use crate::error::Result;
use crate::types::BlogPost;

use super::{Publisher, RenderedPost};

pub struct DiscussionPublisher;

impl Publisher for DiscussionPublisher {
    fn platform(&self) -> &'static str {
        "discussion"
    }

    fn render(&self, post: &BlogPost) -> Result<RenderedPost> {
        let mut content = format!("# {}\n\n", post.title);

        // Body without the duplicate top-level heading
        let body: Vec<&str> = post
            .body_markdown
            .lines()
            .filter(|l| !l.starts_with("# "))
            .collect();
        content.push_str(body.join("\n").trim());

        let starter = post
            .body_markdown
            .lines()
            .find(|l| l.trim_end().ends_with('?'))
            .map(|l| l.trim().to_string())
            .unwrap_or_else(|| format!("How do you approach {}?", topic_of(post)));
        content.push_str(&format!("\n\n---\n\n{}", starter));

        Ok(RenderedPost {
            platform: self.platform().to_string(),
            slug: post.slug.clone(),
            content,
            payload: None,
        })
    }
}

fn topic_of(post: &BlogPost) -> String {
    post.themes
        .first()
        .or(post.projects.first())
        .cloned()
        .unwrap_or_else(|| "this".to_string())
}
