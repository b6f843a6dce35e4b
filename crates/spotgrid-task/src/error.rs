//! Task error types.

use thiserror::Error;

/// Result type alias for task operations.
pub type TaskResult<T> = Result<T, TaskError>;

/// Errors that can occur dispatching or executing tasks.
#[derive(Debug, Error)]
pub enum TaskError {
    /// No function under this name. Fatal for the task, never retried.
    #[error("function '{0}' is not registered")]
    NotRegistered(String),

    #[error("argument serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Queue(#[from] spotgrid_queue::QueueError),

    #[error(transparent)]
    Status(#[from] spotgrid_status::StatusError),
}
