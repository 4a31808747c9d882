//! Plain-markdown dialect
//!
//! The canonical rendered form: front matter straight from the post, body
//! untouched. Other platforms deviate from this baseline.

use crate::error::Result;
use crate::store::frontmatter;
use crate::types::BlogPost;

use super::{Publisher, RenderedPost};

pub struct MarkdownPublisher;

impl Publisher for MarkdownPublisher {
    fn platform(&self) -> &'static str {
        "markdown"
    }

    fn render(&self, post: &BlogPost) -> Result<RenderedPost> {
        let content = frontmatter::render(post, &post.body_markdown)?;
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
    fn render_keeps_body_and_frontmatter() {
        let rendered = MarkdownPublisher.render(&post()).unwrap();
        assert!(rendered.content.starts_with("---\n"));
        assert!(rendered.content.contains("slug: weekly-2026-W06"));
        assert!(rendered.content.contains("## The cache rewrite"));
        assert!(rendered.payload.is_none());
    }
}
