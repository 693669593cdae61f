use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span};

use crate::concurrency::channel::BoundedChannel;
use crate::concurrency::shutdown::ShutdownRx;
use crate::delay::{DelayStrategy, SharedDelay, sleep_next};
use crate::error::{ErrorKind, FlowResult};
use crate::flow_error;
use crate::metrics::FLOW_ITEMS_GENERATED_TOTAL;
use crate::types::{ItemId, WorkItem};
use crate::workers::base::{Worker, WorkerHandle, WorkerType};

/// Progress of a running [`Generator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorState {
    /// Items put on the output channel so far.
    pub generated: u64,
    /// Items the generator was asked to produce.
    pub items_count: u64,
}

/// Produces `items_count` raw items with ids `0..items_count`, one delay apart.
///
/// A shutdown request stops production early; items that were never put are simply not
/// produced.
#[derive(Debug)]
pub struct Generator {
    items_count: u64,
    delay: SharedDelay,
    output: BoundedChannel<WorkItem>,
    shutdown_rx: ShutdownRx,
}

impl Generator {
    pub fn new(
        items_count: u64,
        delay: SharedDelay,
        output: BoundedChannel<WorkItem>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            items_count,
            delay,
            output,
            shutdown_rx,
        }
    }

    async fn run(self, generated: Arc<AtomicU64>) -> FlowResult<u64> {
        let Generator {
            items_count,
            delay,
            output,
            mut shutdown_rx,
        } = self;

        info!(items_count, "starting generator");

        for id in 0..items_count {
            tokio::select! {
                biased;

                _ = shutdown_rx.wait_for_shutdown() => {
                    info!(
                        generated = generated.load(Ordering::Relaxed),
                        items_count,
                        "generator stopped by shutdown"
                    );
                    break;
                }
                result = produce(id, delay.as_ref(), &output) => {
                    result?;
                    generated.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        let generated = generated.load(Ordering::Relaxed);
        info!(generated, "generator completed");

        Ok(generated)
    }
}

/// Builds the payload of a freshly generated item.
fn initial_payload(id: ItemId) -> Bytes {
    Bytes::from(format!("item-{id}"))
}

async fn produce(
    id: ItemId,
    delay: &dyn DelayStrategy,
    output: &BoundedChannel<WorkItem>,
) -> FlowResult<()> {
    sleep_next(delay).await;

    let item = WorkItem::new(id, initial_payload(id));
    debug!(%item, "generated item");
    output.put(item).await?;

    counter!(FLOW_ITEMS_GENERATED_TOTAL).increment(1);

    Ok(())
}

/// Handle to a running [`Generator`].
#[derive(Debug)]
pub struct GeneratorHandle {
    items_count: u64,
    generated: Arc<AtomicU64>,
    handle: JoinHandle<FlowResult<u64>>,
}

impl Worker<GeneratorHandle, GeneratorState> for Generator {
    fn start(self) -> GeneratorHandle {
        let items_count = self.items_count;
        let generated = Arc::new(AtomicU64::new(0));
        let span = info_span!("task", kind = %WorkerType::Generator);
        let handle = tokio::spawn(self.run(generated.clone()).instrument(span));

        GeneratorHandle {
            items_count,
            generated,
            handle,
        }
    }
}

impl WorkerHandle<GeneratorState> for GeneratorHandle {
    type Output = u64;

    fn state(&self) -> GeneratorState {
        GeneratorState {
            generated: self.generated.load(Ordering::Relaxed),
            items_count: self.items_count,
        }
    }

    async fn wait(self) -> FlowResult<u64> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) => Err(flow_error!(
                ErrorKind::GeneratorPanic,
                "Generator task failed",
                err.to_string(),
                source: err
            )),
        }
    }
}
