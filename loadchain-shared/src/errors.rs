//! Error taxonomy for chain construction and execution.

use thiserror::Error;

/// Result alias used across loadchain.
pub type LoadchainResult<T> = Result<T, LoadchainError>;

#[derive(Debug, Error)]
pub enum LoadchainError {
    /// Missing or malformed configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Stage type name outside the known set.
    #[error("invalid stage type: {0}")]
    InvalidStageType(String),

    /// Unexpected failure while constructing a stage.
    #[error("stage construction failed: {0}")]
    StageConstruction(String),

    /// Mediator buffer could not be created.
    #[error("mediator buffer unavailable: {0}")]
    MediatorUnavailable(String),

    /// Failure while starting, joining or interrupting a chain element.
    #[error("execution failure: {0}")]
    Execution(String),

    /// Failure while releasing a chain element.
    #[error("close failure: {0}")]
    Close(String),

    /// Lifecycle operation not allowed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}
