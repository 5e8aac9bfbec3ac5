//! Error type shared by every layer of the engine.

use thiserror::Error;

/// Everything that can go wrong while loading, scheduling or evaluating.
#[derive(Debug, Error)]
pub enum LaeError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("index {index} out of range for length {len}")]
    OutOfRange { index: usize, len: usize },

    #[error("vector length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("worker {worker} already has a queued task")]
    Busy { worker: usize },

    #[error("worker {worker} has stopped accepting tasks")]
    WorkerStopped { worker: usize },

    #[error("executor has been shut down")]
    ShutDown,

    #[error("interrupted while waiting for an idle worker")]
    Interrupted,

    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("task panicked: {0}")]
    TaskPanicked(String),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed input: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LaeError>;
