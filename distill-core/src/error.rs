//! Error types for distill-core

use thiserror::Error;

/// Main error type for the distill-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A source root could not be read at all; fatal for that source only
    #[error("source unavailable: {source_name}: {message}")]
    SourceUnavailable { source_name: String, message: String },

    /// Parse error for a single record or file (soft; callers keep going)
    #[error("parse error in {source_name}: {message}")]
    Parse { source_name: String, message: String },

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Front matter (de)serialization error
    #[error("front matter error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The LLM worker could not be invoked or produced no usable output
    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    /// The LLM worker exceeded its deadline
    #[error("LLM timed out after {0} seconds")]
    LlmTimeout(u64),

    /// Generated text fell below the acceptable length band
    #[error("generated content too short: {words} words (target {target})")]
    ContentTooShort { words: usize, target: usize },

    /// Generated text exceeded the acceptable length band
    #[error("generated content too long: {words} words (target {target})")]
    ContentTooLong { words: usize, target: usize },

    /// A publishing target refused the payload
    #[error("publisher {platform} rejected post: {message}")]
    PublisherRejected { platform: String, message: String },

    /// Durable state could not be decoded; fatal for the whole run
    #[error("state corrupt at {path}: {message}")]
    StateCorrupt { path: String, message: String },
}

impl Error {
    /// Whether this error is worth another attempt under the retry budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::LlmUnavailable(_) | Error::LlmTimeout(_))
    }
}

/// Result type alias for distill-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(Error::LlmTimeout(120).is_retryable());
        assert!(Error::LlmUnavailable("empty output".into()).is_retryable());
        assert!(!Error::Config("bad key".into()).is_retryable());
        assert!(!Error::StateCorrupt {
            path: "x".into(),
            message: "y".into()
        }
        .is_retryable());
    }
}
