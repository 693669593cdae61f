//! Flow runner binary.
//!
//! Loads the runner configuration, initializes telemetry and runs a single pipeline to
//! completion, shutting it down gracefully on SIGINT or SIGTERM.

use anyhow::Context;
use clap::Parser;
use flow_config::shared::RunnerConfig;
use flow_telemetry::metrics::init_metrics;
use flow_telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::{CliOverrides, load_runner_config};
use crate::core::run_pipeline_with_config;

mod config;
mod core;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of items to generate, overrides `pipeline.items_count`.
    #[arg(long)]
    items: Option<u64>,

    /// Number of concurrent workers, overrides `pipeline.worker_count`.
    #[arg(long)]
    workers: Option<u16>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let runner_config = load_runner_config(CliOverrides {
        items_count: args.items,
        worker_count: args.workers,
    })?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(runner_config))
}

async fn async_main(runner_config: RunnerConfig) -> anyhow::Result<()> {
    // The exporter spawns its listener on the current runtime.
    if let Some(metrics_config) = &runner_config.metrics {
        init_metrics(metrics_config.port, env!("CARGO_BIN_NAME"))
            .context("failed to install the prometheus exporter")?;
    }

    if let Err(err) = run_pipeline_with_config(runner_config).await {
        error!("{err:#}");
        return Err(err);
    }

    Ok(())
}
