//! Queue error types.

use thiserror::Error;

/// Result type alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur talking to the task queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("broker error: {0}")]
    Broker(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("task {0} failed: {1}")]
    TaskFailed(String, String),

    #[error("timed out waiting for result of task {0}")]
    ResultTimeout(String),

    #[error("unknown delivery: {0}")]
    UnknownDelivery(String),
}
