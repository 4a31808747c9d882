//! Shared HTTP delivery plumbing
//!
//! Network publishers hold one of these: a reqwest client plus a
//! current-thread runtime, so synchronous pipeline code can block on a
//! delivery. Transient failures (5xx, timeouts) are retried with backoff;
//! 4xx responses are rejections and fail immediately.

use crate::error::{Error, Result};
use reqwest::header::HeaderMap;
use std::time::Duration;

const MAX_RETRIES: u32 = 3;
const INITIAL_DELAY: Duration = Duration::from_millis(500);

pub struct HttpSender {
    platform: &'static str,
    runtime: tokio::runtime::Runtime,
    client: reqwest::Client,
}

impl HttpSender {
    pub fn new(platform: &'static str, headers: HeaderMap, timeout_secs: u64) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Config(format!("failed to build runtime: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            platform,
            runtime,
            client,
        })
    }

    /// POST a JSON body, retrying transient failures. Returns the response
    /// body as JSON (or `null` for empty bodies).
    pub fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        self.runtime.block_on(async {
            let mut delay = INITIAL_DELAY;
            let mut last_error = None;

            for attempt in 0..=MAX_RETRIES {
                if attempt > 0 {
                    tracing::debug!(
                        platform = self.platform,
                        attempt = attempt + 1,
                        "Retrying delivery"
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                }

                match self.try_post(url, body).await {
                    Ok(value) => return Ok(value),
                    Err(e) if is_transient(&e) => {
                        tracing::warn!(platform = self.platform, error = %e, "Transient delivery failure");
                        last_error = Some(e);
                    }
                    Err(e) => return Err(e),
                }
            }

            Err(last_error.unwrap_or_else(|| Error::PublisherRejected {
                platform: self.platform.to_string(),
                message: "retries exhausted".to_string(),
            }))
        })
    }

    async fn try_post(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::PublisherRejected {
                platform: self.platform.to_string(),
                message: format!("request failed: {}", e),
            })?;

        let status = response.status();
        if status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if text.trim().is_empty() {
                return Ok(serde_json::Value::Null);
            }
            Ok(serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)))
        } else {
            let body = response.text().await.unwrap_or_else(|_| "unknown".to_string());
            Err(Error::PublisherRejected {
                platform: self.platform.to_string(),
                message: format!("{}: {}", status.as_u16(), body),
            })
        }
    }
}

fn is_transient(error: &Error) -> bool {
    match error {
        Error::PublisherRejected { message, .. } => {
            message.starts_with("5")
                || message.contains("request failed")
                || message.contains("timeout")
        }
        _ => false,
    }
}
