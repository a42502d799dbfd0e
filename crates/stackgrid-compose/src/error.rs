//! Error types for external commands and project directories.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for command and project operations.
pub type ComposeResult<T> = Result<T, ComposeError>;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}")]
    Failed { command: String, status: String },

    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },

    #[error("invalid project id {0:?}")]
    InvalidProject(String),

    #[error("project {0} already exists")]
    ProjectExists(String),

    #[error("no compose descriptor found in {0}")]
    MissingDescriptor(String),

    #[error("failed to parse {file}: {source}")]
    Descriptor {
        file: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
