//! Source-specific parsers
//!
//! Each supported source has a parser module that implements the
//! [`SourceParser`](super::SourceParser) trait.
//!
//! ## Supported Sources
//!
//! | Source | Module | Yields |
//! |--------|--------|--------|
//! | chat-log | [`chat_log`] | sessions |
//! | rollout | [`rollout`] | sessions |
//! | multi-agent | [`multi_agent`] | sessions |
//! | rss | [`rss`] | articles |
//! | browser | [`browser`] | visits |
//! | substack | [`newsletter`] | articles |

pub mod browser;
pub mod chat_log;
pub mod multi_agent;
pub mod newsletter;
pub mod rollout;
pub mod rss;

pub use browser::BrowserHistoryParser;
pub use chat_log::ChatLogParser;
pub use multi_agent::MultiAgentParser;
pub use newsletter::NewsletterExportParser;
pub use rollout::RolloutParser;
pub use rss::FeedParser;

use super::SourceParser;
use crate::config::Config;
use crate::types::Source;

/// Create all parsers enabled by the given configuration.
pub fn create_parsers(config: &Config) -> Vec<Box<dyn SourceParser>> {
    let mut parsers: Vec<Box<dyn SourceParser>> = Vec::new();

    for source in &config.sessions.sources {
        match source {
            Source::ChatLog => {
                let parser = match &config.sessions.chat_log_root {
                    Some(root) => {
                        ChatLogParser::with_root(root.clone(), config.sessions.include_global)
                    }
                    None => ChatLogParser::new(config.sessions.include_global),
                };
                parsers.push(Box::new(parser));
            }
            Source::Rollout => {
                let parser = match &config.sessions.rollout_root {
                    Some(root) => RolloutParser::with_root(root.clone()),
                    None => RolloutParser::new(),
                };
                parsers.push(Box::new(parser));
            }
            Source::MultiAgent => {
                let parser = match &config.sessions.multi_agent_root {
                    Some(root) => MultiAgentParser::with_root(root.clone()),
                    None => MultiAgentParser::new(),
                };
                parsers.push(Box::new(parser));
            }
            other => {
                tracing::warn!(source = %other, "No session parser for source, ignoring");
            }
        }
    }

    if config.intake.enabled {
        if !config.intake.feeds.is_empty() {
            parsers.push(Box::new(FeedParser::new(config.intake.feeds.clone())));
        }
        if !config.intake.browser_profiles.is_empty() {
            parsers.push(Box::new(BrowserHistoryParser::new(
                config.intake.browser_profiles.clone(),
            )));
        }
        if !config.intake.newsletter_exports.is_empty() {
            parsers.push(Box::new(NewsletterExportParser::new(
                config.intake.newsletter_exports.clone(),
            )));
        }
    }

    parsers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_parsers_respects_config() {
        let mut config = Config::default();
        config.intake.feeds = vec!["https://example.com/feed.xml".to_string()];
        let parsers = create_parsers(&config);

        let sources: Vec<Source> = parsers.iter().map(|p| p.source()).collect();
        assert!(sources.contains(&Source::ChatLog));
        assert!(sources.contains(&Source::Rollout));
        assert!(sources.contains(&Source::MultiAgent));
        assert!(sources.contains(&Source::Rss));
        assert!(!sources.contains(&Source::Browser));
    }

    #[test]
    fn test_intake_disabled_drops_feeds() {
        let mut config = Config::default();
        config.intake.enabled = false;
        config.intake.feeds = vec!["https://example.com/feed.xml".to_string()];
        let parsers = create_parsers(&config);
        assert!(parsers.iter().all(|p| p.source() != Source::Rss));
    }
}
