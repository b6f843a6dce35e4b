//! Driver-side subcommands: run, attach, status, purge.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use spot_core::SpotConfig;
use spotgrid_fleet::{FleetManager, RentPolicy, RentRequest};
use spotgrid_market::MarketClient;
use spotgrid_monitor::{wait_for_handles, JobMonitor};
use spotgrid_queue::{Broker, MemoryBroker};
use spotgrid_status::{RedbBackend, StatusStore};
use spotgrid_store::{FsStore, ObjectStore};
use spotgrid_task::{TaskDispatcher, TaskExecutor, RetryPolicy};

const DEFAULT_BASE_URL: &str = "https://console.vast.ai/api/v0";

/// How long `run` waits for rented workers to boot before monitoring.
const WORKER_BOOT_GRACE: Duration = Duration::from_secs(30);

fn open_status(config: &SpotConfig) -> anyhow::Result<StatusStore> {
    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let backend = RedbBackend::open(&data_dir.join("spotgrid.redb"))?;
    Ok(StatusStore::new(Arc::new(backend)))
}

fn fleet(config: &SpotConfig) -> FleetManager {
    let base_url = config
        .marketplace
        .base_url
        .clone()
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let market = Arc::new(MarketClient::new(base_url, config.api_key()));
    FleetManager::new(market, RentPolicy::default())
}

/// Environment exported to worker processes on rented nodes.
fn worker_env(config: &SpotConfig) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("SPOTGRID_API_KEY".to_string(), config.api_key().to_string());
    env.insert(
        "SPOTGRID_DATA_DIR".to_string(),
        config.data_dir().display().to_string(),
    );
    if let Some(repo) = &config.storage.repo_id {
        env.insert("SPOTGRID_STORE_REPO".to_string(), repo.clone());
    }
    if let Some(token) = &config.storage.token {
        env.insert("SPOTGRID_STORE_TOKEN".to_string(), token.clone());
    }
    env
}

/// Write a small manifest naming the job and upload it to the result
/// store, so the repository shows which runs produced its contents.
async fn upload_run_marker(config: &SpotConfig, job_id: &str) -> anyhow::Result<()> {
    let store = FsStore::new(config.data_dir().join("store"))?;
    let marker = config.data_dir().join(format!("{job_id}.run"));
    std::fs::write(&marker, job_id)?;
    store.upload_file(&marker).await?;
    std::fs::remove_file(&marker)?;
    Ok(())
}

/// Rent, dispatch, monitor, tear down.
pub async fn run(config: &SpotConfig, job_id: &str, tasks: u32, local: bool) -> anyhow::Result<()> {
    config.validate()?;
    let status = open_status(config)?;
    let broker: Arc<MemoryBroker> = Arc::new(MemoryBroker::new());
    let dispatcher = TaskDispatcher::new(broker.clone(), status.clone());

    let registry = crate::worker_mode::demo_registry();
    let fleet = fleet(config);

    // Record that this run happened in the result repository. Upload
    // failures are logged, not raised.
    if let Err(e) = upload_run_marker(config, job_id).await {
        warn!(error = %e, "could not upload run marker");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let rented = if local {
        Vec::new()
    } else {
        let request = RentRequest {
            price_ceiling: config.job.max_price.unwrap_or(0.1),
            max_nodes: config.job.max_nodes.unwrap_or(1) as usize,
            image: config
                .job
                .image
                .clone()
                .ok_or_else(|| anyhow::anyhow!("job.image is required to rent nodes"))?,
            command: config.job.command.clone(),
            env: worker_env(config),
        };
        info!(job_id, max_nodes = request.max_nodes, "renting nodes");
        let rented = fleet.rent_nodes(&request).await?;
        if rented.is_empty() {
            warn!("no nodes rented; tasks will wait until workers appear");
        } else {
            info!(rented = rented.len(), "fleet ready");
        }
        rented
    };

    // In local mode the worker loop runs in this process.
    let local_worker = local.then(|| {
        let executor = TaskExecutor::new(
            registry.clone(),
            broker.clone(),
            status.clone(),
            RetryPolicy::default(),
        );
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move { executor.run(shutdown_rx).await })
    });

    let job = job_id.to_string();
    let mut handles = Vec::with_capacity(tasks as usize);
    for i in 0..tasks {
        let args = serde_json::json!({"index": i, "a": i, "b": i + 1});
        handles.push(dispatcher.dispatch(&job, "add", &args).await?);
    }
    info!(count = handles.len(), job_id, "tasks dispatched");

    if !local && !rented.is_empty() {
        tokio::time::sleep(WORKER_BOOT_GRACE).await;
    }

    // Monitor until done or interrupted. The dispatching run still
    // holds handles, so progress comes from them; the status store
    // remains the source of truth for the final tallies.
    let monitor = JobMonitor::new(status.clone());
    tokio::select! {
        _ = wait_for_handles(&handles, Duration::from_secs(1)) => {
            let counts = monitor.check_status(&job)?;
            info!(success = counts.success, failure = counts.failure, "all tasks finished");
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, shutting down");
        }
    }

    // Cleanup runs on both paths: terminate every rented node, stop the
    // local worker, and clear queue and status state.
    let _ = shutdown_tx.send(true);
    if let Some(worker) = local_worker {
        let _ = worker.await;
    }
    fleet.terminate_all().await;
    broker.purge().await?;
    status.purge_all()?;
    info!("run complete");
    Ok(())
}

/// Re-attach to a job dispatched by an earlier driver run.
pub async fn attach(config: &SpotConfig, job_id: &str) -> anyhow::Result<()> {
    let status = open_status(config)?;
    let monitor = JobMonitor::new(status);
    let job = job_id.to_string();

    if !monitor.attachable(&job)? {
        let counts = monitor.check_status(&job)?;
        info!(
            job_id,
            success = counts.success,
            failure = counts.failure,
            "job has no outstanding work; nothing to attach to"
        );
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ctrl_c = tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
    });

    let counts = monitor.monitor(&job, shutdown_rx).await?;
    ctrl_c.abort();
    info!(
        job_id,
        success = counts.success,
        failure = counts.failure,
        "detached"
    );
    Ok(())
}

/// One-shot status dump.
pub fn status(config: &SpotConfig, job_id: &str) -> anyhow::Result<()> {
    let status = open_status(config)?;
    let monitor = JobMonitor::new(status);
    let counts = monitor.check_status(&job_id.to_string())?;
    println!(
        "job {job_id}: pending={} started={} retry={} failure={} success={} unknown={}",
        counts.pending, counts.started, counts.retry, counts.failure, counts.success, counts.unknown
    );
    Ok(())
}

/// Full-reset cleanup of task and job state.
pub async fn purge(config: &SpotConfig) -> anyhow::Result<()> {
    let status = open_status(config)?;
    let removed = status.purge_all()?;
    info!(removed, "state purged");
    Ok(())
}
