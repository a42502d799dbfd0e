//! Error types for graph store access.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store endpoint {0:?}: {1}")]
    Endpoint(String, String),

    #[error("failed to connect to store: {0}")]
    Connect(String),

    #[error("store request failed: {0}")]
    Request(String),

    #[error("store answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("store request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to decode store response: {0}")]
    Decode(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
