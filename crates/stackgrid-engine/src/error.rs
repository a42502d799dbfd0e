//! Error types for the engine.

use thiserror::Error;

use stackgrid_compose::ComposeError;
use stackgrid_core::DeltaError;
use stackgrid_monitor::MonitorError;
use stackgrid_store::StoreError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid change-feed payload: {0}")]
    Delta(#[from] DeltaError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("log retrieval timed out")]
    LogsTimedOut,
}
