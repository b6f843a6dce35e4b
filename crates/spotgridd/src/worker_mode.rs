//! Worker entry point.
//!
//! Rented nodes launch this subcommand from the image's startup
//! command. It builds the registry, connects to the broker and status
//! store configured in the environment, and executes tasks serially
//! until interrupted. Deployments with a networked broker plug it in
//! behind the `Broker` trait; the in-tree broker keeps a single-host
//! worker fully functional for local runs and tests.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use spot_core::SpotConfig;
use spotgrid_queue::MemoryBroker;
use spotgrid_status::{RedbBackend, StatusStore};
use spotgrid_task::{FunctionRegistry, RetryPolicy, TaskExecutor};

/// Registry of functions this deployment executes.
///
/// The demo function mirrors the driver's dispatch: add two numbers and
/// report the sum.
pub fn demo_registry() -> FunctionRegistry {
    let registry = FunctionRegistry::new();
    registry.register("add", |args| {
        let a = args["a"].as_i64().unwrap_or(0);
        let b = args["b"].as_i64().unwrap_or(0);
        Ok(serde_json::json!(a + b))
    });
    registry
}

pub async fn run(config: &SpotConfig) -> anyhow::Result<()> {
    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let backend = RedbBackend::open(&data_dir.join("spotgrid.redb"))?;
    let status = StatusStore::new(Arc::new(backend));
    let broker = Arc::new(MemoryBroker::new());

    let registry = demo_registry();
    let executor = TaskExecutor::new(registry, broker, status, RetryPolicy::default());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("interrupt received");
        let _ = shutdown_tx.send(true);
    });

    executor.run(shutdown_rx).await;
    Ok(())
}
