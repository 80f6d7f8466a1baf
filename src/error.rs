//! Error types for the realtime hub.

use thiserror::Error;

/// Main error type for hub operations.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Subscriber limit reached ({limit} active)")]
    SubscriberLimit { limit: usize },

    #[error("Hub has been shut down")]
    ShutDown,

    #[error("Invalid subscriber id: {0:?}")]
    InvalidSubscriberId(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Worker error: {0}")]
    Worker(String),
}

impl From<serde_json::Error> for HubError {
    fn from(e: serde_json::Error) -> Self {
        HubError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for HubError {
    fn from(e: std::io::Error) -> Self {
        HubError::Worker(e.to_string())
    }
}

/// Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
