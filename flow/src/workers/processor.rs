use metrics::counter;
use tracing::{debug, error, info, warn};

use flow_config::shared::CancellationMode;

use crate::concurrency::channel::{BoundedChannel, Delivery, DeliveryId};
use crate::concurrency::shutdown::ShutdownRx;
use crate::delay::{DelayStrategy, SharedDelay, sleep_next};
use crate::error::FlowResult;
use crate::metrics::{
    FLOW_ITEMS_FAILED_TOTAL, FLOW_ITEMS_LOST_TOTAL, FLOW_ITEMS_PROCESSED_TOTAL, WORKER_ID_LABEL,
};
use crate::transform::Transform;
use crate::types::{ItemId, Payload, WorkItem};
use crate::workers::base::WorkerId;

/// Per-worker outcome counters, returned when a [`ProcessorWorker`] stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub worker_id: WorkerId,
    /// Items forwarded with status `processed`.
    pub processed: u64,
    /// Items forwarded with status `failed`.
    pub failed: u64,
    /// Items dequeued but interrupted by shutdown before being forwarded.
    pub lost: u64,
}

impl WorkerSummary {
    fn new(worker_id: WorkerId) -> Self {
        Self {
            worker_id,
            ..Default::default()
        }
    }

    /// Items this worker forwarded downstream.
    pub fn forwarded(&self) -> u64 {
        self.processed + self.failed
    }
}

/// Moves items from the raw channel to the processed channel.
///
/// For every delivery the worker sleeps for the configured delay, runs the transform, puts the
/// settled item on the output and only then acknowledges the input delivery. Every delivery is
/// settled exactly once: acknowledged after a successful forward, abandoned otherwise.
#[derive(Debug)]
pub struct ProcessorWorker<T> {
    worker_id: WorkerId,
    input: BoundedChannel<WorkItem>,
    output: BoundedChannel<WorkItem>,
    transform: T,
    delay: SharedDelay,
    cancellation: CancellationMode,
    shutdown_rx: ShutdownRx,
}

impl<T> ProcessorWorker<T>
where
    T: Transform + Send + Sync + 'static,
{
    pub fn new(
        worker_id: WorkerId,
        input: BoundedChannel<WorkItem>,
        output: BoundedChannel<WorkItem>,
        transform: T,
        delay: SharedDelay,
        cancellation: CancellationMode,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            worker_id,
            input,
            output,
            transform,
            delay,
            cancellation,
            shutdown_rx,
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Runs the worker until shutdown is requested or the input is closed and empty.
    pub async fn run(self) -> FlowResult<WorkerSummary> {
        let ProcessorWorker {
            worker_id,
            input,
            output,
            transform,
            delay,
            cancellation,
            mut shutdown_rx,
        } = self;

        let mut summary = WorkerSummary::new(worker_id);
        let worker_label = worker_id.to_string();

        info!(worker_id, %cancellation, "starting processor worker");

        loop {
            let delivery = tokio::select! {
                biased;

                _ = shutdown_rx.wait_for_shutdown() => {
                    debug!(worker_id, "shutdown requested while idle");
                    break;
                }
                delivery = input.get() => delivery,
            };

            let Some(Delivery { id, mut item }) = delivery else {
                info!(worker_id, "input channel closed and empty");
                break;
            };
            let held = HeldDelivery::new(&input, id, item.id(), worker_id);

            debug!(worker_id, item_id = item.id(), "picked up item");

            let outcome = match cancellation {
                CancellationMode::Deferred => {
                    Some(process(&transform, delay.as_ref(), &item).await)
                }
                CancellationMode::Immediate => tokio::select! {
                    biased;

                    _ = shutdown_rx.wait_for_shutdown() => None,
                    outcome = process(&transform, delay.as_ref(), &item) => Some(outcome),
                },
            };

            let Some(outcome) = outcome else {
                held.abandon()?;
                summary.lost += 1;
                counter!(FLOW_ITEMS_LOST_TOTAL, WORKER_ID_LABEL => worker_label.clone())
                    .increment(1);
                warn!(
                    worker_id,
                    item_id = item.id(),
                    "shutdown interrupted item processing, item is lost"
                );
                break;
            };

            match outcome {
                Ok(payload) => {
                    item.mark_processed(payload)?;
                    summary.processed += 1;
                    counter!(FLOW_ITEMS_PROCESSED_TOTAL, WORKER_ID_LABEL => worker_label.clone())
                        .increment(1);
                }
                Err(err) => {
                    error!(worker_id, item_id = item.id(), error = %err, "transform failed");
                    item.mark_failed()?;
                    summary.failed += 1;
                    counter!(FLOW_ITEMS_FAILED_TOTAL, WORKER_ID_LABEL => worker_label.clone())
                        .increment(1);
                }
            }

            debug!(worker_id, %item, "forwarding item");

            // The input delivery is only acknowledged once the output holds the item.
            if let Err(err) = output.put(item).await {
                held.abandon()?;
                summary.lost += 1;
                return Err(err);
            }
            held.ack()?;
        }

        info!(
            worker_id,
            processed = summary.processed,
            failed = summary.failed,
            lost = summary.lost,
            "processor worker stopped"
        );

        Ok(summary)
    }
}

/// Input delivery a worker holds until it settles it.
///
/// Dropping it unsettled, on an early return or while a panic unwinds the worker, abandons the
/// delivery and counts the item as lost, so the input channel can still drain.
struct HeldDelivery<'a> {
    input: &'a BoundedChannel<WorkItem>,
    id: DeliveryId,
    item_id: ItemId,
    worker_id: WorkerId,
    settled: bool,
}

impl<'a> HeldDelivery<'a> {
    fn new(
        input: &'a BoundedChannel<WorkItem>,
        id: DeliveryId,
        item_id: ItemId,
        worker_id: WorkerId,
    ) -> Self {
        Self {
            input,
            id,
            item_id,
            worker_id,
            settled: false,
        }
    }

    fn ack(mut self) -> FlowResult<()> {
        self.settled = true;
        self.input.ack(self.id)
    }

    fn abandon(mut self) -> FlowResult<()> {
        self.settled = true;
        self.input.abandon(self.id)
    }
}

impl Drop for HeldDelivery<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        if let Err(err) = self.input.abandon(self.id) {
            error!(
                worker_id = self.worker_id,
                item_id = self.item_id,
                error = %err,
                "failed to abandon unsettled delivery"
            );
            return;
        }

        counter!(FLOW_ITEMS_LOST_TOTAL, WORKER_ID_LABEL => self.worker_id.to_string()).increment(1);
        warn!(
            worker_id = self.worker_id,
            item_id = self.item_id,
            "worker stopped while holding an item, item is lost"
        );
    }
}

async fn process<T>(
    transform: &T,
    delay: &dyn DelayStrategy,
    item: &WorkItem,
) -> FlowResult<Payload>
where
    T: Transform,
{
    sleep_next(delay).await;
    transform.transform(item).await
}
