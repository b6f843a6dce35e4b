//! spotgridd — the spotgrid driver and worker binary.
//!
//! One binary, two roles:
//! - the driver rents marketplace nodes, dispatches tasks, and monitors
//!   the job to completion (`run`), or re-attaches to a job a previous
//!   driver left behind (`attach`, `status`);
//! - the worker entry point runs on rented nodes and executes tasks
//!   until stopped (`worker`).
//!
//! # Usage
//!
//! ```text
//! spotgridd run --config spotgrid.toml --tasks 10
//! spotgridd attach --config spotgrid.toml --job-id render-42
//! spotgridd status --config spotgrid.toml --job-id render-42
//! spotgridd worker --config spotgrid.toml
//! spotgridd purge --config spotgrid.toml
//! ```

mod driver;
mod worker_mode;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "spotgridd", about = "Spotgrid driver and worker")]
struct Cli {
    /// Path to the config file. Environment variables override it.
    #[arg(long, global = true, default_value = "spotgrid.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rent a fleet, dispatch tasks, and monitor to completion.
    Run {
        /// Job identifier. Generated when omitted.
        #[arg(long)]
        job_id: Option<String>,

        /// Number of demo tasks to dispatch.
        #[arg(long, default_value = "10")]
        tasks: u32,

        /// Execute tasks in-process instead of renting nodes.
        #[arg(long)]
        local: bool,
    },

    /// Re-attach to a job in progress and monitor it.
    Attach {
        #[arg(long)]
        job_id: String,
    },

    /// Print a one-shot status summary for a job.
    Status {
        #[arg(long)]
        job_id: String,
    },

    /// Run the worker loop until interrupted.
    Worker,

    /// Delete all task, job, and queue state.
    Purge,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,spotgridd=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = spot_core::SpotConfig::load(&cli.config)?;

    match cli.command {
        Command::Run {
            job_id,
            tasks,
            local,
        } => {
            let job_id = job_id.unwrap_or_else(|| format!("job-{}", uuid::Uuid::new_v4()));
            driver::run(&config, &job_id, tasks, local).await
        }
        Command::Attach { job_id } => driver::attach(&config, &job_id).await,
        Command::Status { job_id } => driver::status(&config, &job_id),
        Command::Worker => worker_mode::run(&config).await,
        Command::Purge => driver::purge(&config).await,
    }
}
