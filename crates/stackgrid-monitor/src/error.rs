//! Error types for the container runtime and its event stream.

use thiserror::Error;

/// Result type alias for monitor operations.
pub type MonitorResult<T> = Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("container runtime error: {0}")]
    Runtime(String),

    #[error("event stream failed: {0}")]
    Stream(String),

    #[error("event stream closed")]
    StreamClosed,
}
