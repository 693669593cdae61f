use flow::error::ErrorKind;
use flow::pipeline::{Pipeline, PipelineReport};
use flow_config::shared::RunnerConfig;
use tracing::{info, warn};

/// Runs one pipeline described by `runner_config` until it completes or is interrupted.
///
/// An interrupted run that lost no item is not an error; lost items are.
pub async fn run_pipeline_with_config(runner_config: RunnerConfig) -> anyhow::Result<()> {
    let pipeline = Pipeline::new(runner_config.pipeline);

    let config = pipeline.config();
    info!(
        items_count = config.items_count,
        worker_count = config.worker_count,
        cancellation = %config.cancellation,
        drain_timeout_ms = config.drain_timeout_ms,
        "starting flow runner"
    );

    let report = start_pipeline(pipeline).await?;

    log_report(&report);

    if let Err(err) = report.ensure_complete() {
        if err.kind() == ErrorKind::ItemLost {
            return Err(err.into());
        }

        warn!(error = %err, "pipeline was interrupted before completion");
    }

    Ok(())
}

/// Starts a pipeline and handles graceful shutdown signals.
///
/// Launches the pipeline and sets up signal handlers for SIGTERM and SIGINT. A signal requests
/// shutdown; the pipeline then settles every in-flight item before returning.
#[tracing::instrument(skip(pipeline))]
async fn start_pipeline(mut pipeline: Pipeline) -> anyhow::Result<PipelineReport> {
    pipeline.start()?;

    // Spawn a task to listen for shutdown signals and trigger shutdown.
    let shutdown_tx = pipeline.shutdown_tx();
    let shutdown_handle = tokio::spawn(async move {
        wait_for_signal().await;
        shutdown_tx.shutdown();
        info!("shutdown signal sent to the pipeline");
    });

    let result = pipeline.wait().await;

    // The pipeline may finish before any signal arrives.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    Ok(result?)
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("sigint (ctrl+c) received, shutting down pipeline");
                    }
                    _ = sigterm.recv() => {
                        info!("sigterm received, shutting down pipeline");
                    }
                }
                return;
            }
            Err(err) => warn!(error = %err, "failed to register sigterm handler"),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("sigint (ctrl+c) received, shutting down pipeline"),
        Err(err) => {
            warn!(error = %err, "failed to listen for ctrl+c, signals will be ignored");
            std::future::pending::<()>().await;
        }
    }
}

fn log_report(report: &PipelineReport) {
    for item in &report.items {
        info!(item_id = item.id(), status = %item.status(), "aggregated item");
    }

    for summary in &report.workers {
        info!(
            worker_id = summary.worker_id,
            processed = summary.processed,
            failed = summary.failed,
            lost = summary.lost,
            "worker summary"
        );
    }

    info!(
        expected = report.expected,
        generated = report.generated,
        aggregated = report.aggregated(),
        failed = report.failed,
        lost = report.lost,
        abandoned = report.abandoned,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "pipeline report"
    );
}
