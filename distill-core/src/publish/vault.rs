//! Local-vault dialect
//!
//! Renders with wiki-links for projects and themes plus front matter, and
//! delivers by writing into the configured vault directory.

use crate::config::VaultPublisherConfig;
use crate::error::Result;
use crate::store::frontmatter;
use crate::types::BlogPost;
use chrono::Utc;

use super::{DeliveryReceipt, Publisher, RenderedPost};

pub struct VaultPublisher {
    config: VaultPublisherConfig,
}

impl VaultPublisher {
    pub fn new(config: VaultPublisherConfig) -> Self {
        Self { config }
    }
}

impl Publisher for VaultPublisher {
    fn platform(&self) -> &'static str {
        "vault"
    }

    fn render(&self, post: &BlogPost) -> Result<RenderedPost> {
        let mut body = post.body_markdown.clone();

        let links: Vec<String> = post
            .projects
            .iter()
            .chain(post.themes.iter())
            .map(|name| format!("[[{}]]", name))
            .collect();
        if !links.is_empty() {
            body.push_str("\n\n---\n\nRelated: ");
            body.push_str(&links.join(" · "));
        }

        let content = frontmatter::render(post, &body)?;
        Ok(RenderedPost {
            platform: self.platform().to_string(),
            slug: post.slug.clone(),
            content,
            payload: None,
        })
    }

    fn deliver(&self, payload: &RenderedPost) -> Result<DeliveryReceipt> {
        std::fs::create_dir_all(&self.config.directory)?;
        let target = self.config.directory.join(format!("{}.md", payload.slug));
        std::fs::write(&target, &payload.content)?;
        Ok(DeliveryReceipt {
            platform: self.platform().to_string(),
            destination: target.display().to_string(),
            delivered_at: Utc::now(),
        })
    }
}
