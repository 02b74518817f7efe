//! Error types for the subscriber.

use std::time::Duration;
use thiserror::Error;

/// Errors returned to callers of the outbound subscription path.
///
/// Inbound verification failures never surface here; they are turned into
/// HTTP status codes by [`crate::verification`].
#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Token generation failed: {0}")]
    Generation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Hub request did not complete within {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Hub rejected subscription request with status {status}: {body}")]
    SubscriptionRejected { status: u16, body: String },

    #[error("No hub known for topic: {0}")]
    NoHubForTopic(String),

    #[error("Not subscribed to topic: {0}")]
    NotSubscribed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SubscriberError {
    /// Whether the caller may retry the same request without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubscriberError::Transport(_) | SubscriberError::DeadlineExceeded(_)
        )
    }
}

impl From<reqwest::Error> for SubscriberError {
    fn from(e: reqwest::Error) -> Self {
        SubscriberError::Transport(e.to_string())
    }
}

impl From<url::ParseError> for SubscriberError {
    fn from(e: url::ParseError) -> Self {
        SubscriberError::InvalidTopic(e.to_string())
    }
}

/// Result type for subscriber operations.
pub type Result<T> = std::result::Result<T, SubscriberError>;
