//! Driver-side task handles.

use std::sync::Arc;
use std::time::Duration;

use spot_core::TaskId;

use crate::broker::{Broker, TaskOutcome};
use crate::error::{QueueError, QueueResult};

/// How often `result` re-checks the broker while blocking.
const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A handle to one dispatched task.
///
/// Valid only in the process that holds a broker connection; re-attach
/// scenarios go through the status store instead, which needs no
/// handles.
#[derive(Clone)]
pub struct TaskHandle {
    id: TaskId,
    broker: Arc<dyn Broker>,
}

impl TaskHandle {
    pub fn new(id: TaskId, broker: Arc<dyn Broker>) -> Self {
        Self { id, broker }
    }

    /// The queue-assigned task id.
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Whether the task has reached a terminal outcome.
    pub async fn ready(&self) -> bool {
        matches!(self.broker.fetch_result(&self.id).await, Ok(Some(_)))
    }

    /// Block until the task finishes or `timeout` elapses.
    ///
    /// A failed task surfaces as `QueueError::TaskFailed`.
    pub async fn result(&self, timeout: Duration) -> QueueResult<serde_json::Value> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(outcome) = self.broker.fetch_result(&self.id).await? {
                return match outcome {
                    TaskOutcome::Ok { value } => Ok(value),
                    TaskOutcome::Err { message } => {
                        Err(QueueError::TaskFailed(self.id.clone(), message))
                    }
                };
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(QueueError::ResultTimeout(self.id.clone()));
            }
            tokio::time::sleep(RESULT_POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;

    #[tokio::test]
    async fn ready_flips_when_result_is_stored() {
        let broker = Arc::new(MemoryBroker::new());
        let id = broker.submit("f", "{}").await.unwrap();
        let handle = TaskHandle::new(id.clone(), broker.clone());

        assert!(!handle.ready().await);
        broker
            .store_result(&id, TaskOutcome::Ok { value: serde_json::json!("done") })
            .await
            .unwrap();
        assert!(handle.ready().await);
    }

    #[tokio::test]
    async fn result_returns_value_on_success() {
        let broker = Arc::new(MemoryBroker::new());
        let id = broker.submit("f", "{}").await.unwrap();
        broker
            .store_result(&id, TaskOutcome::Ok { value: serde_json::json!(30) })
            .await
            .unwrap();

        let handle = TaskHandle::new(id, broker);
        let value = handle.result(Duration::from_secs(1)).await.unwrap();
        assert_eq!(value, serde_json::json!(30));
    }

    #[tokio::test]
    async fn result_surfaces_task_failure() {
        let broker = Arc::new(MemoryBroker::new());
        let id = broker.submit("f", "{}").await.unwrap();
        broker
            .store_result(&id, TaskOutcome::Err { message: "divide by zero".into() })
            .await
            .unwrap();

        let handle = TaskHandle::new(id, broker);
        assert!(matches!(
            handle.result(Duration::from_secs(1)).await,
            Err(QueueError::TaskFailed(_, msg)) if msg == "divide by zero"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn result_times_out_when_task_never_finishes() {
        let broker = Arc::new(MemoryBroker::new());
        let id = broker.submit("f", "{}").await.unwrap();

        let handle = TaskHandle::new(id, broker);
        assert!(matches!(
            handle.result(Duration::from_secs(2)).await,
            Err(QueueError::ResultTimeout(_))
        ));
    }
}
