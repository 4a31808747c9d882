//! Scheduler dialect
//!
//! Forwards a short-form rendition to an external social-scheduling
//! service, which fans it out to its configured downstream networks.

use crate::config::SchedulerPublisherConfig;
use crate::error::Result;
use crate::types::BlogPost;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use super::net::HttpSender;
use super::{DeliveryReceipt, Publisher, RenderedPost};

/// Character budget for the forwarded summary.
const SUMMARY_CHARS: usize = 600;

pub struct SchedulerPublisher {
    config: SchedulerPublisherConfig,
    sender: HttpSender,
}

impl SchedulerPublisher {
    pub fn new(config: SchedulerPublisherConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&config.api_key)
                .map_err(|e| crate::error::Error::Config(format!("invalid api key: {}", e)))?,
        );

        let sender = HttpSender::new("scheduler", headers, config.timeout_secs)?;
        Ok(Self { config, sender })
    }
}

impl Publisher for SchedulerPublisher {
    fn platform(&self) -> &'static str {
        "scheduler"
    }

    fn render(&self, post: &BlogPost) -> Result<RenderedPost> {
        let summary = summarize(&post.body_markdown, SUMMARY_CHARS);
        let content = format!("{}\n\n{}", post.title, summary);

        let payload = serde_json::json!({
            "name": post.title,
            "content": content,
            "platforms": self.config.networks,
        });

        Ok(RenderedPost {
            platform: self.platform().to_string(),
            slug: post.slug.clone(),
            content,
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

        let url = format!("{}/api/posts", self.config.url.trim_end_matches('/'));
        self.sender.post_json(&url, body)?;

        Ok(DeliveryReceipt {
            platform: self.platform().to_string(),
            destination: url,
            delivered_at: Utc::now(),
        })
    }
}

/// First prose paragraph, clipped to the budget on a word boundary.
fn summarize(markdown: &str, budget: usize) -> String {
    let paragraph = markdown
        .split("\n\n")
        .map(str::trim)
        .find(|p| !p.is_empty() && !p.starts_with('#') && !p.starts_with("```"))
        .unwrap_or("");

    if paragraph.len() <= budget {
        return paragraph.to_string();
    }
    let mut clipped = String::new();
    for word in paragraph.split_whitespace() {
        if clipped.len() + word.len() + 1 > budget {
            break;
        }
        if !clipped.is_empty() {
            clipped.push(' ');
        }
        clipped.push_str(word);
    }
    clipped.push('…');
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::tests::post;

    fn config() -> SchedulerPublisherConfig {
        SchedulerPublisherConfig {
            url: "https://scheduler.example.com".to_string(),
            api_key: "key".to_string(),
            networks: vec!["mastodon".to_string(), "bluesky".to_string()],
            timeout_secs: 30,
        }
    }

    #[test]
    fn payload_carries_networks() {
        let publisher = SchedulerPublisher::new(config()).unwrap();
        let rendered = publisher.render(&post()).unwrap();
        let payload = rendered.payload.unwrap();
        assert_eq!(payload["name"], "Week six");
        assert_eq!(payload["platforms"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn summary_is_prose_not_headings() {
        let publisher = SchedulerPublisher::new(config()).unwrap();
        let rendered = publisher.render(&post()).unwrap();
        assert!(!rendered.content.contains('#'));
        assert!(rendered.content.contains("It held up."));
    }
}
