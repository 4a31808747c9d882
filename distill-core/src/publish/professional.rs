//! Professional-post dialect
//!
//! Headline, flattened prose without markdown structure, and a hashtag
//! line derived from themes and projects.

use crate::error::Result;
use crate::types::BlogPost;

use super::{Publisher, RenderedPost};

/// Soft cap keeping posts inside typical feed limits.
const BODY_CHAR_CAP: usize = 2800;

pub struct ProfessionalPublisher;

impl Publisher for ProfessionalPublisher {
    fn platform(&self) -> &'static str {
        "professional"
    }

    fn render(&self, post: &BlogPost) -> Result<RenderedPost> {
        let mut body = String::new();
        let mut in_code = false;
        for line in post.body_markdown.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with("```") {
                in_code = !in_code;
                continue;
            }
            if in_code || trimmed.starts_with('#') || trimmed.starts_with("<!--") {
                continue;
            }
            body.push_str(trimmed);
            body.push('\n');
        }
        let mut body = body.trim().to_string();
        if body.len() > BODY_CHAR_CAP {
            let mut end = BODY_CHAR_CAP;
            while end > 0 && !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
            body.push('…');
        }

        let hashtags: Vec<String> = post
            .themes
            .iter()
            .chain(post.projects.iter())
            .map(|t| format!("#{}", slug::slugify(t).replace('-', "")))
            .collect();

        let mut content = format!("{}\n\n{}", post.title, body);
        if !hashtags.is_empty() {
            content.push_str("\n\n");
            content.push_str(&hashtags.join(" "));
        }

        Ok(RenderedPost {
            platform: self.platform().to_string(),
            slug: post.slug.clone(),
            content,
            payload: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::tests::post;

    #[test]
    fn render_has_headline_and_hashtags() {
        let rendered = ProfessionalPublisher.render(&post()).unwrap();
        assert!(rendered.content.starts_with("Week six\n"));
        assert!(rendered.content.contains("#caching"));
        assert!(rendered.content.contains("#alpha"));
        assert!(!rendered.content.contains("##"));
    }

    #[test]
    fn long_bodies_are_capped() {
        let mut long_post = post();
        long_post.body_markdown = format!("# T\n\n{}", "words and more words. ".repeat(400));
        let rendered = ProfessionalPublisher.render(&long_post).unwrap();
        assert!(rendered.content.len() < BODY_CHAR_CAP + 200);
        assert!(rendered.content.contains('…'));
    }
}
