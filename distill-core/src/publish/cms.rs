//! CMS dialect
//!
//! Ghost-style CMS: markdown posted to an authenticated admin API as a
//! draft. The render keeps the markdown body; the payload carries it with
//! title, slug, and tags.

use crate::config::CmsPublisherConfig;
use crate::error::Result;
use crate::types::BlogPost;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use super::net::HttpSender;
use super::{DeliveryReceipt, Publisher, RenderedPost};

pub struct CmsPublisher {
    config: CmsPublisherConfig,
    sender: HttpSender,
}

impl CmsPublisher {
    pub fn new(config: CmsPublisherConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth = format!("Ghost {}", config.admin_token);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|e| crate::error::Error::Config(format!("invalid admin token: {}", e)))?,
        );

        let sender = HttpSender::new("cms", headers, config.timeout_secs)?;
        Ok(Self { config, sender })
    }

    fn posts_url(&self) -> String {
        format!(
            "{}/ghost/api/admin/posts/?source=markdown",
            self.config.url.trim_end_matches('/')
        )
    }
}

impl Publisher for CmsPublisher {
    fn platform(&self) -> &'static str {
        "cms"
    }

    fn render(&self, post: &BlogPost) -> Result<RenderedPost> {
        let tags: Vec<&String> = post.themes.iter().chain(post.projects.iter()).collect();
        let payload = serde_json::json!({
            "posts": [{
                "title": post.title,
                "slug": post.slug,
                "markdown": post.body_markdown,
                "tags": tags,
                "status": "draft",
            }]
        });

        Ok(RenderedPost {
            platform: self.platform().to_string(),
            slug: post.slug.clone(),
            content: post.body_markdown.clone(),
            payload: Some(payload),
        })
    }

    fn deliver(&self, payload: &RenderedPost) -> Result<DeliveryReceipt> {
        let body = payload
            .payload
            .as_ref()
            .ok_or_else(|| crate::error::Error::PublisherRejected {
                platform: self.platform().to_string(),
                message: "render produced no payload".to_string(),
            })?;

        let url = self.posts_url();
        let response = self.sender.post_json(&url, body)?;

        let destination = response
            .get("posts")
            .and_then(|p| p.as_array())
            .and_then(|a| a.first())
            .and_then(|p| p.get("url"))
            .and_then(|u| u.as_str())
            .map(str::to_string)
            .unwrap_or(url);

        Ok(DeliveryReceipt {
            platform: self.platform().to_string(),
            destination,
            delivered_at: Utc::now(),
        })
    }
}
