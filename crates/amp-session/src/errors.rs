//! Error types for connections and configuration.

use thiserror::Error;

/// Failure reported by a [`Connection`](crate::connection::Connection).
///
/// The session treats every variant as a disconnect.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The connection was closed, locally or by the peer.
    #[error("connection closed")]
    Closed,
    /// Transport I/O failure.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when loading session configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration file is not valid JSON for [`SessionConfig`](crate::config::SessionConfig).
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A value is outside its allowed range.
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Result type for configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;
