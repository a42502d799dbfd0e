//! Error types for change-feed parsing and configuration.

use thiserror::Error;

/// Result type alias for change-feed parsing.
pub type DeltaResult<T> = Result<T, DeltaError>;

/// A change-feed payload that cannot be turned into delta batches.
#[derive(Debug, Error)]
pub enum DeltaError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected payload shape: {0}")]
    Shape(String),

    #[error("unsupported object type {kind:?} in triple with subject {subject}")]
    ObjectType { subject: String, kind: String },
}

/// Errors loading the daemon configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration {0:?} for {1}")]
    Duration(String, &'static str),
}
