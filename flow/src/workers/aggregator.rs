use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::concurrency::channel::{BoundedChannel, Delivery};
use crate::error::{ErrorKind, FlowResult};
use crate::flow_error;
use crate::metrics::FLOW_ITEMS_AGGREGATED_TOTAL;
use crate::types::WorkItem;
use crate::workers::base::{Worker, WorkerHandle, WorkerType};

/// Upper bound on the buffer reserved up front for aggregated items.
const MAX_INITIAL_CAPACITY: u64 = 1024;

/// Progress of a running [`Aggregator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregatorState {
    /// Items received so far.
    pub received: u64,
    /// Items the aggregator waits for.
    pub expected: u64,
}

/// Collects processed items in arrival order.
///
/// The aggregator stops after `expected` items, or earlier when its input is closed and empty.
/// It never observes shutdown directly: the controller closes its input once no producer is
/// left.
#[derive(Debug)]
pub struct Aggregator {
    expected: u64,
    input: BoundedChannel<WorkItem>,
}

impl Aggregator {
    pub fn new(expected: u64, input: BoundedChannel<WorkItem>) -> Self {
        Self { expected, input }
    }

    async fn run(self, received: Arc<AtomicU64>) -> FlowResult<Vec<WorkItem>> {
        let Aggregator { expected, input } = self;
        let mut items = Vec::with_capacity(expected.min(MAX_INITIAL_CAPACITY) as usize);

        info!(expected, "starting aggregator");

        while (items.len() as u64) < expected {
            let Some(Delivery { id, item }) = input.get().await else {
                warn!(
                    received = items.len(),
                    expected, "input closed before every expected item arrived"
                );
                break;
            };

            debug!(%item, "aggregated item");
            input.ack(id)?;
            items.push(item);

            received.fetch_add(1, Ordering::Relaxed);
            counter!(FLOW_ITEMS_AGGREGATED_TOTAL).increment(1);
        }

        info!(received = items.len(), expected, "aggregator completed");

        Ok(items)
    }
}

/// Handle to a running [`Aggregator`].
#[derive(Debug)]
pub struct AggregatorHandle {
    expected: u64,
    received: Arc<AtomicU64>,
    handle: JoinHandle<FlowResult<Vec<WorkItem>>>,
}

impl Worker<AggregatorHandle, AggregatorState> for Aggregator {
    fn start(self) -> AggregatorHandle {
        let expected = self.expected;
        let received = Arc::new(AtomicU64::new(0));
        let span = info_span!("task", kind = %WorkerType::Aggregator);
        let handle = tokio::spawn(self.run(received.clone()).instrument(span));

        AggregatorHandle {
            expected,
            received,
            handle,
        }
    }
}

impl WorkerHandle<AggregatorState> for AggregatorHandle {
    type Output = Vec<WorkItem>;

    fn state(&self) -> AggregatorState {
        AggregatorState {
            received: self.received.load(Ordering::Relaxed),
            expected: self.expected,
        }
    }

    async fn wait(self) -> FlowResult<Vec<WorkItem>> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) => Err(flow_error!(
                ErrorKind::AggregatorPanic,
                "Aggregator task failed",
                err.to_string(),
                source: err
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn item(id: u64) -> WorkItem {
        let mut item = WorkItem::new(id, Bytes::from_static(b"payload"));
        item.mark_processed(Bytes::from_static(b"done")).unwrap();
        item
    }

    #[tokio::test]
    async fn collects_expected_items_in_arrival_order() {
        let input = BoundedChannel::unbounded("processed");
        for id in [2, 0, 1] {
            input.put(item(id)).await.unwrap();
        }

        let handle = Aggregator::new(3, input.clone()).start();
        let items = handle.wait().await.unwrap();

        let ids: Vec<_> = items.iter().map(WorkItem::id).collect();
        assert_eq!(ids, vec![2, 0, 1]);
        input.drain_wait().await;
        assert_eq!(input.stats().acknowledged, 3);
    }

    #[tokio::test]
    async fn stops_early_when_input_closes() {
        let input = BoundedChannel::unbounded("processed");
        input.put(item(0)).await.unwrap();

        let handle = Aggregator::new(5, input.clone()).start();
        input.close();

        let items = handle.wait().await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn leaves_surplus_items_queued() {
        let input = BoundedChannel::unbounded("processed");
        for id in 0..3 {
            input.put(item(id)).await.unwrap();
        }

        let handle = Aggregator::new(2, input.clone()).start();
        assert_eq!(handle.wait().await.unwrap().len(), 2);
        assert_eq!(input.stats().queued, 1);
    }
}
