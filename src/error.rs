//! Error types for the storefront engine

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error types
///
/// Nothing in the engine is fatal to the host application. These errors are
/// produced by internal steps and are caught, logged and turned into an empty
/// result at the public boundary (`instant_load`, `record`, poll ticks, ...).
#[derive(Error, Debug)]
pub enum EngineError {
    /// Transient network failure (fetch error, push send error)
    #[error("Network error: {0}")]
    Network(String),

    /// Resource not found in the content store
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization or deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Local storage read or write failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Malformed or unexpected push frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Push connection closed underneath a send
    #[error("Channel closed")]
    ChannelClosed,
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Storage(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for EngineError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        EngineError::Network(err.to_string())
    }
}
