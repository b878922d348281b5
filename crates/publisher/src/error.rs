//! Error types for the publishing pipeline.

use thiserror::Error;

/// Result type for publisher operations.
pub type Result<T> = std::result::Result<T, AutoPostError>;

/// Publisher errors.
///
/// Link-card and thumbnail failures are reported with these variants too, but
/// the pipeline downgrades them to "no embed" instead of aborting the post.
#[derive(Debug, Error)]
pub enum AutoPostError {
    /// Bad credentials or unreachable identity endpoint
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Transport failure (connection refused, DNS, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Image too large, empty or of an unsupported type
    #[error("Validation error: {0}")]
    Validation(String),

    /// Remote service answered with a non-200 status
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Response body did not have the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Publication state could not be read or written
    #[error("State store error: {0}")]
    State(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AutoPostError {
    pub(crate) fn network(err: impl std::fmt::Display) -> Self {
        Self::Network(err.to_string())
    }

    pub(crate) fn parse(err: impl std::fmt::Display) -> Self {
        Self::Parse(err.to_string())
    }

    pub(crate) fn state(err: impl std::fmt::Display) -> Self {
        Self::State(err.to_string())
    }
}
