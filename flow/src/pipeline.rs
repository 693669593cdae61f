//! Pipeline controller wiring the generator, the worker pool and the aggregator together.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use flow_config::shared::PipelineConfig;
use metrics::{counter, histogram};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::bail;
use crate::concurrency::channel::{BoundedChannel, ChannelStats};
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::delay::{SharedDelay, delay_from_config};
use crate::error::{ErrorKind, FlowError, FlowResult};
use crate::metrics::{CHANNEL_LABEL, FLOW_ITEMS_ABANDONED_TOTAL, FLOW_PIPELINE_DURATION_SECONDS};
use crate::transform::{MarkProcessed, Transform};
use crate::types::{ItemId, ItemStatus, WorkItem};
use crate::workers::aggregator::{Aggregator, AggregatorHandle};
use crate::workers::base::{Worker, WorkerHandle};
use crate::workers::generator::{Generator, GeneratorHandle};
use crate::workers::pool::WorkerPool;
use crate::workers::processor::{ProcessorWorker, WorkerSummary};

/// Name of the channel between the generator and the workers.
pub const RAW_CHANNEL: &str = "raw";

/// Name of the channel between the workers and the aggregator.
pub const PROCESSED_CHANNEL: &str = "processed";

/// Lifecycle phase of a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    /// Created, nothing spawned yet.
    Idle,
    /// All tasks spawned, the generator is producing.
    Running,
    /// Generation finished, waiting for in-flight items to be acknowledged.
    Draining,
    /// Workers were told to stop and are being joined.
    ShuttingDown,
    /// Every task has completed.
    Done,
}

impl PipelinePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelinePhase::Idle => "idle",
            PipelinePhase::Running => "running",
            PipelinePhase::Draining => "draining",
            PipelinePhase::ShuttingDown => "shutting_down",
            PipelinePhase::Done => "done",
        }
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a completed pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Items the pipeline was configured to produce.
    pub expected: u64,
    /// Items the generator actually put on the raw channel.
    pub generated: u64,
    /// Items received by the aggregator, in arrival order.
    pub items: Vec<WorkItem>,
    /// Items forwarded with status `failed`.
    pub failed: u64,
    /// Items dequeued by a worker and interrupted by shutdown.
    pub lost: u64,
    /// Items still queued on the raw channel when the workers stopped.
    pub abandoned: u64,
    /// Per-worker outcome, sorted by worker id.
    pub workers: Vec<WorkerSummary>,
    pub raw_channel: ChannelStats,
    pub processed_channel: ChannelStats,
    pub elapsed: Duration,
}

impl PipelineReport {
    /// Number of items received by the aggregator.
    pub fn aggregated(&self) -> u64 {
        self.items.len() as u64
    }

    /// Ids of the aggregated items, in arrival order.
    pub fn aggregated_ids(&self) -> Vec<ItemId> {
        self.items.iter().map(WorkItem::id).collect()
    }

    /// Number of aggregated items with the given status.
    pub fn count_with_status(&self, status: ItemStatus) -> u64 {
        self.items
            .iter()
            .filter(|item| item.status() == status)
            .count() as u64
    }

    /// Returns `true` when every expected item reached the aggregator and none was lost.
    pub fn is_complete(&self) -> bool {
        self.lost == 0 && self.aggregated() == self.expected
    }

    /// Turns an incomplete run into an error.
    ///
    /// Lost items yield [`ErrorKind::ItemLost`]; a run stopped before every item was aggregated
    /// yields [`ErrorKind::InvalidState`].
    pub fn ensure_complete(&self) -> FlowResult<()> {
        if self.lost > 0 {
            bail!(
                ErrorKind::ItemLost,
                "Items were lost during shutdown",
                format!(
                    "{} items were dequeued by a worker and never forwarded",
                    self.lost
                )
            );
        }

        if self.aggregated() != self.expected {
            bail!(
                ErrorKind::InvalidState,
                "Pipeline stopped before every item was aggregated",
                format!(
                    "aggregated {} of {} expected items",
                    self.aggregated(),
                    self.expected
                )
            );
        }

        Ok(())
    }
}

#[derive(Debug)]
enum PipelineState {
    NotStarted,
    Started {
        generator: GeneratorHandle,
        pool: WorkerPool,
        aggregator: AggregatorHandle,
        raw: BoundedChannel<WorkItem>,
        processed: BoundedChannel<WorkItem>,
        started_at: Instant,
    },
    Finished,
}

/// Generator → workers → aggregator pipeline with graceful shutdown.
///
/// Call [`Pipeline::start`] to spawn every task and [`Pipeline::wait`] to drive the run to
/// completion, or [`Pipeline::run`] for both. [`Pipeline::shutdown`] requests an early stop from
/// any point in between.
#[derive(Debug)]
pub struct Pipeline<T = MarkProcessed> {
    config: Arc<PipelineConfig>,
    transform: T,
    generator_delay: SharedDelay,
    worker_delay: SharedDelay,
    state: PipelineState,
    shutdown_tx: ShutdownTx,
    phase_tx: watch::Sender<PipelinePhase>,
}

impl Pipeline<MarkProcessed> {
    /// Creates a pipeline using the default [`MarkProcessed`] transform.
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_transform(config, MarkProcessed)
    }
}

impl<T> Pipeline<T>
where
    T: Transform + Clone + Send + Sync + 'static,
{
    /// Creates a pipeline whose workers apply `transform` to every item.
    pub fn with_transform(config: PipelineConfig, transform: T) -> Self {
        // The receiver is dropped, every component subscribes through `shutdown_tx`.
        let (shutdown_tx, _) = create_shutdown_channel();
        let (phase_tx, _) = watch::channel(PipelinePhase::Idle);

        Self {
            generator_delay: delay_from_config(&config.delays.generator),
            worker_delay: delay_from_config(&config.delays.worker),
            config: Arc::new(config),
            transform,
            state: PipelineState::NotStarted,
            shutdown_tx,
            phase_tx,
        }
    }

    /// Replaces the delay strategies built from the configuration.
    pub fn with_delays(mut self, generator: SharedDelay, worker: SharedDelay) -> Self {
        self.generator_delay = generator;
        self.worker_delay = worker;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> PipelinePhase {
        *self.phase_tx.borrow()
    }

    /// Subscribes to lifecycle phase changes.
    pub fn subscribe_phase(&self) -> watch::Receiver<PipelinePhase> {
        self.phase_tx.subscribe()
    }

    /// Validates the configuration and spawns the aggregator, the workers and the generator.
    ///
    /// Configuration errors are returned before any task is spawned.
    pub fn start(&mut self) -> FlowResult<()> {
        if !matches!(self.state, PipelineState::NotStarted) {
            bail!(
                ErrorKind::InvalidState,
                "Pipeline was already started",
                format!("pipeline is in phase '{}'", self.phase())
            );
        }

        self.config.validate()?;

        info!(
            items_count = self.config.items_count,
            worker_count = self.config.worker_count,
            cancellation = %self.config.cancellation,
            "starting pipeline"
        );

        let raw = BoundedChannel::new(
            RAW_CHANNEL,
            self.config.channel.raw_capacity.and_then(NonZeroUsize::new),
        );
        let processed = BoundedChannel::new(
            PROCESSED_CHANNEL,
            self.config.channel.processed_capacity.and_then(NonZeroUsize::new),
        );

        for channel in [&raw, &processed] {
            debug!(
                channel = channel.name(),
                capacity = channel.capacity().map(NonZeroUsize::get),
                "created channel"
            );
        }

        let aggregator = Aggregator::new(self.config.items_count, processed.clone()).start();

        let mut pool = WorkerPool::new();
        for worker_id in 0..self.config.worker_count {
            pool.spawn(ProcessorWorker::new(
                worker_id,
                raw.clone(),
                processed.clone(),
                self.transform.clone(),
                self.worker_delay.clone(),
                self.config.cancellation,
                self.shutdown_tx.subscribe(),
            ));
        }

        let generator = Generator::new(
            self.config.items_count,
            self.generator_delay.clone(),
            raw.clone(),
            self.shutdown_tx.subscribe(),
        )
        .start();

        self.state = PipelineState::Started {
            generator,
            pool,
            aggregator,
            raw,
            processed,
            started_at: Instant::now(),
        };
        transition(&self.phase_tx, PipelinePhase::Running);

        Ok(())
    }

    /// Drives a started pipeline to completion and returns its report.
    ///
    /// Every task is joined before returning, also when an error occurs along the way. All
    /// errors collected during the run are returned together.
    pub async fn wait(mut self) -> FlowResult<PipelineReport> {
        let PipelineState::Started {
            generator,
            mut pool,
            aggregator,
            raw,
            processed,
            started_at,
        } = std::mem::replace(&mut self.state, PipelineState::Finished)
        else {
            bail!(
                ErrorKind::InvalidState,
                "Pipeline was not started",
                format!("pipeline is in phase '{}'", self.phase())
            );
        };

        let mut errors: Vec<FlowError> = vec![];
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!("waiting for generator to complete");

        // A bounded raw channel blocks the generator forever once every worker is gone.
        let generator_wait = generator.wait();
        tokio::pin!(generator_wait);
        let generator_result = tokio::select! {
            biased;

            result = &mut generator_wait => result,
            _ = pool.wait_for_failure() => {
                warn!("a worker failed while generating, shutting down");
                self.shutdown_tx.shutdown();
                generator_wait.await
            }
        };

        let generated = match generator_result {
            Ok(generated) => generated,
            Err(err) => {
                error!(error = %err, "generator completed with error");
                errors.push(err);
                raw.stats().enqueued
            }
        };

        transition(&self.phase_tx, PipelinePhase::Draining);

        if !errors.is_empty() {
            info!("skipping drain after generator failure");
        } else if shutdown_rx.is_shutdown() {
            info!("shutdown requested, skipping drain");
        } else {
            let drain_timeout = self.config.drain_timeout();
            let drain = async {
                match drain_timeout {
                    Some(deadline) => raw.drain_wait_timeout(deadline).await,
                    None => {
                        raw.drain_wait().await;
                        Ok(())
                    }
                }
            };

            tokio::select! {
                biased;

                _ = shutdown_rx.wait_for_shutdown() => {
                    info!("shutdown requested while draining");
                }
                _ = pool.wait_for_failure() => {
                    warn!("a worker failed while draining, shutting down");
                }
                result = drain => match result {
                    Ok(()) => debug!("raw channel drained"),
                    Err(err) => {
                        error!(error = %err, "raw channel did not drain in time");
                        errors.push(err);
                    }
                }
            }
        }

        transition(&self.phase_tx, PipelinePhase::ShuttingDown);
        self.shutdown_tx.shutdown();

        info!("waiting for workers to complete");

        let workers = match pool.wait_all().await {
            Ok(summaries) => summaries,
            Err(err) => {
                let errors_number = err.kinds().len();
                errors.push(err);
                info!(errors_number, "workers failed with an error");
                vec![]
            }
        };

        // Items nobody dequeued are settled here so the raw channel ends fully accounted.
        raw.close();
        let abandoned = raw.abandon_queued().len() as u64;
        if abandoned > 0 {
            counter!(FLOW_ITEMS_ABANDONED_TOTAL, CHANNEL_LABEL => RAW_CHANNEL).increment(abandoned);
            warn!(abandoned, "abandoned queued items that no worker picked up");
        }

        processed.close();

        info!("waiting for aggregator to complete");

        let items = match aggregator.wait().await {
            Ok(items) => items,
            Err(err) => {
                error!(error = %err, "aggregator completed with error");
                errors.push(err);
                vec![]
            }
        };

        let elapsed = started_at.elapsed();
        histogram!(FLOW_PIPELINE_DURATION_SECONDS).record(elapsed.as_secs_f64());
        transition(&self.phase_tx, PipelinePhase::Done);

        if !errors.is_empty() {
            return Err(errors.into());
        }

        let report = PipelineReport {
            expected: self.config.items_count,
            generated,
            failed: workers.iter().map(|summary| summary.failed).sum(),
            lost: workers.iter().map(|summary| summary.lost).sum(),
            abandoned,
            workers,
            raw_channel: raw.stats(),
            processed_channel: processed.stats(),
            items,
            elapsed,
        };

        info!(
            generated = report.generated,
            aggregated = report.aggregated(),
            failed = report.failed,
            lost = report.lost,
            abandoned = report.abandoned,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "pipeline completed"
        );

        Ok(report)
    }

    /// Starts the pipeline and waits for it to complete.
    pub async fn run(mut self) -> FlowResult<PipelineReport> {
        self.start()?;
        self.wait().await
    }

    /// Requests every task to stop as soon as possible.
    pub fn shutdown(&self) {
        info!("trying to shut down the pipeline");
        self.shutdown_tx.shutdown();
        info!("shut down signal successfully sent to all tasks");
    }

    pub async fn shutdown_and_wait(self) -> FlowResult<PipelineReport> {
        self.shutdown();
        self.wait().await
    }
}

fn transition(phase_tx: &watch::Sender<PipelinePhase>, phase: PipelinePhase) {
    let previous = phase_tx.send_replace(phase);
    info!(from = %previous, to = %phase, "pipeline phase changed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay::FixedDelay;

    fn zero_delay_pipeline(items_count: u64, worker_count: u16) -> Pipeline {
        Pipeline::new(PipelineConfig::new(items_count, worker_count))
            .with_delays(Arc::new(FixedDelay::ZERO), Arc::new(FixedDelay::ZERO))
    }

    #[tokio::test]
    async fn phases_advance_to_done() {
        let mut pipeline = zero_delay_pipeline(3, 2);
        assert_eq!(pipeline.phase(), PipelinePhase::Idle);

        let phase_rx = pipeline.subscribe_phase();
        pipeline.start().unwrap();
        assert_eq!(*phase_rx.borrow(), PipelinePhase::Running);

        let report = pipeline.wait().await.unwrap();
        assert_eq!(*phase_rx.borrow(), PipelinePhase::Done);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn starting_twice_is_rejected() {
        let mut pipeline = zero_delay_pipeline(1, 1);
        pipeline.start().unwrap();

        let err = pipeline.start().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        pipeline.wait().await.unwrap();
    }

    #[tokio::test]
    async fn waiting_without_start_is_rejected() {
        let err = zero_delay_pipeline(1, 1).wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn invalid_config_fails_before_start() {
        let mut pipeline = zero_delay_pipeline(5, 0);

        let err = pipeline.start().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
        assert_eq!(pipeline.phase(), PipelinePhase::Idle);
    }

    #[tokio::test]
    async fn shutdown_and_wait_joins_every_task() {
        let mut pipeline = Pipeline::new(PipelineConfig::new(5, 2)).with_delays(
            Arc::new(FixedDelay(Duration::from_secs(3600))),
            Arc::new(FixedDelay::ZERO),
        );
        assert_eq!(pipeline.config().items_count, 5);
        pipeline.start().unwrap();

        let report = pipeline.shutdown_and_wait().await.unwrap();

        assert_eq!(report.generated, 0);
        assert_eq!(report.aggregated(), 0);
        assert_eq!(report.workers.len(), 2);
        assert_eq!(report.raw_channel.pending, 0);
        assert_eq!(
            report.ensure_complete().unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }

    #[test]
    fn report_completeness() {
        let mut report = PipelineReport {
            expected: 2,
            ..Default::default()
        };
        assert_eq!(
            report.ensure_complete().unwrap_err().kind(),
            ErrorKind::InvalidState
        );

        report.lost = 1;
        assert_eq!(
            report.ensure_complete().unwrap_err().kind(),
            ErrorKind::ItemLost
        );

        report.expected = 0;
        report.lost = 0;
        assert!(report.ensure_complete().is_ok());
    }
}
