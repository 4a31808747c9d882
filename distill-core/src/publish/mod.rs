//! Publisher fan-out
//!
//! A publisher adapts one canonical post to a platform dialect and delivers
//! it. Rendering is pure; the rendered form is persisted by the store under
//! `blog/<platform>/`, and delivery (where the platform has an outside —
//! a vault directory, a CMS, a scheduler) happens afterwards. Platforms
//! share no state, so fan-out for a single post runs them in parallel;
//! cancellation is honored between platforms.

mod cms;
mod discussion;
mod markdown;
mod net;
mod professional;
mod scheduler;
mod thread;
mod vault;

pub use cms::CmsPublisher;
pub use discussion::DiscussionPublisher;
pub use markdown::MarkdownPublisher;
pub use professional::ProfessionalPublisher;
pub use scheduler::SchedulerPublisher;
pub use thread::ThreadPublisher;
pub use vault::VaultPublisher;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::BlogPost;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};

/// A post rendered into one platform's dialect.
#[derive(Debug, Clone)]
pub struct RenderedPost {
    pub platform: String,
    pub slug: String,
    /// Persisted under `blog/<platform>/<slug>.md`
    pub content: String,
    /// Network payload, for platforms that deliver over HTTP
    pub payload: Option<serde_json::Value>,
}

/// Proof of one delivery.
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub platform: String,
    pub destination: String,
    pub delivered_at: DateTime<Utc>,
}

impl DeliveryReceipt {
    fn local(platform: &str, destination: impl Into<String>) -> Self {
        Self {
            platform: platform.to_string(),
            destination: destination.into(),
            delivered_at: Utc::now(),
        }
    }
}

/// Trait implemented by each platform adapter.
pub trait Publisher: Send + Sync {
    /// Platform identifier, used in paths and config
    fn platform(&self) -> &'static str;

    /// Adapt the canonical post to this platform's dialect.
    fn render(&self, post: &BlogPost) -> Result<RenderedPost>;

    /// Deliver a rendered post to its destination. Local dialects have no
    /// outside beyond the stored render and return a receipt immediately.
    fn deliver(&self, payload: &RenderedPost) -> Result<DeliveryReceipt> {
        Ok(DeliveryReceipt::local(self.platform(), &payload.slug))
    }
}

/// Create publishers for every configured platform identifier.
pub fn create_publishers(config: &Config) -> Result<Vec<Box<dyn Publisher>>> {
    let mut publishers: Vec<Box<dyn Publisher>> = Vec::new();
    for platform in &config.blog.platforms {
        publishers.push(create_publisher(platform, config)?);
    }
    Ok(publishers)
}

fn create_publisher(platform: &str, config: &Config) -> Result<Box<dyn Publisher>> {
    match platform {
        "markdown" => Ok(Box::new(MarkdownPublisher)),
        "thread" => Ok(Box::new(ThreadPublisher)),
        "professional" => Ok(Box::new(ProfessionalPublisher)),
        "discussion" => Ok(Box::new(DiscussionPublisher)),
        "vault" => {
            let vault = config.publishers.vault.as_ref().ok_or_else(|| {
                Error::Config("platform 'vault' requires [publishers.vault]".to_string())
            })?;
            Ok(Box::new(VaultPublisher::new(vault.clone())))
        }
        "cms" => {
            let cms = config.publishers.cms.as_ref().ok_or_else(|| {
                Error::Config("platform 'cms' requires [publishers.cms]".to_string())
            })?;
            Ok(Box::new(CmsPublisher::new(cms.clone())?))
        }
        "scheduler" => {
            let scheduler = config.publishers.scheduler.as_ref().ok_or_else(|| {
                Error::Config("platform 'scheduler' requires [publishers.scheduler]".to_string())
            })?;
            Ok(Box::new(SchedulerPublisher::new(scheduler.clone())?))
        }
        other => Err(Error::Config(format!("unknown platform: {}", other))),
    }
}

/// One platform's outcome within a fan-out.
#[derive(Debug)]
pub struct PublishOutcome {
    pub platform: String,
    pub result: Result<DeliveryReceipt>,
}

/// Render, persist, and deliver one post across all platforms in parallel.
pub fn fan_out(
    publishers: &[Box<dyn Publisher>],
    post: &BlogPost,
    store: &Store,
    cancel: &AtomicBool,
) -> Vec<PublishOutcome> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = publishers
            .iter()
            .map(|publisher| {
                scope.spawn(move || {
                    let platform = publisher.platform().to_string();
                    if cancel.load(Ordering::Relaxed) {
                        return PublishOutcome {
                            platform: platform.clone(),
                            result: Err(Error::PublisherRejected {
                                platform,
                                message: "cancelled before delivery".to_string(),
                            }),
                        };
                    }
                    let result = publish_one(publisher.as_ref(), post, store);
                    PublishOutcome {
                        platform,
                        result,
                    }
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("publisher thread panicked"))
            .collect()
    })
}

fn publish_one(
    publisher: &dyn Publisher,
    post: &BlogPost,
    store: &Store,
) -> Result<DeliveryReceipt> {
    let rendered = publisher.render(post)?;
    let path = store.blog_platform_path(&rendered.platform, &rendered.slug);
    store.atomic_write(&path, rendered.content.as_bytes())?;

    let receipt = publisher.deliver(&rendered)?;
    tracing::info!(
        platform = %receipt.platform,
        destination = %receipt.destination,
        slug = %post.slug,
        "Delivered post"
    );
    Ok(receipt)
}
