//! Handle-polling progress for the dispatching process.

use std::time::Duration;

use tracing::info;

use spotgrid_queue::TaskHandle;

/// Block until every handle is ready, logging progress as tasks finish.
///
/// Only usable in the run that dispatched the tasks; re-attach
/// scenarios have no handles and go through the status store instead.
pub async fn wait_for_handles(handles: &[TaskHandle], interval: Duration) {
    let total = handles.len();
    let mut last_done = usize::MAX;
    loop {
        let mut done = 0;
        for handle in handles {
            if handle.ready().await {
                done += 1;
            }
        }
        if done != last_done {
            info!(done, total, "tasks complete");
            last_done = done;
        }
        if done == total {
            return;
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use spotgrid_queue::{Broker, MemoryBroker, TaskOutcome};

    #[tokio::test]
    async fn returns_once_all_handles_are_ready() {
        let broker = Arc::new(MemoryBroker::new());
        let mut handles = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let id = broker.submit("f", "{}").await.unwrap();
            handles.push(TaskHandle::new(id.clone(), broker.clone()));
            ids.push(id);
        }

        let finisher = {
            let broker = broker.clone();
            tokio::spawn(async move {
                for id in ids {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    broker
                        .store_result(&id, TaskOutcome::Ok { value: serde_json::Value::Null })
                        .await
                        .unwrap();
                }
            })
        };

        wait_for_handles(&handles, Duration::from_millis(5)).await;
        finisher.await.unwrap();
    }

    #[tokio::test]
    async fn empty_handle_list_returns_immediately() {
        wait_for_handles(&[], Duration::from_secs(3600)).await;
    }
}
