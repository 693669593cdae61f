use std::collections::HashSet;

use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, debug, error, info_span, warn};

use crate::error::{ErrorKind, FlowError, FlowResult};
use crate::flow_error;
use crate::transform::Transform;
use crate::workers::base::{WorkerId, WorkerType};
use crate::workers::processor::{ProcessorWorker, WorkerSummary};

type WorkerOutcome = (WorkerId, FlowResult<WorkerSummary>);

/// Pool owning the processor workers of a pipeline.
///
/// [`WorkerPool`] spawns every worker on a [`JoinSet`] and collects their summaries once they
/// stop. Errors and panics of individual workers are gathered instead of short-circuiting, so
/// one failing worker never hides the outcome of the others.
#[derive(Debug)]
pub struct WorkerPool {
    /// Ids of workers that have not completed yet.
    active: HashSet<WorkerId>,
    /// Owns all spawned worker tasks.
    join_set: JoinSet<WorkerOutcome>,
    /// Summaries of workers that already stopped cleanly.
    summaries: Vec<WorkerSummary>,
    /// Errors of workers that already stopped.
    errors: Vec<FlowError>,
}

impl WorkerPool {
    /// Creates a new empty worker pool.
    pub fn new() -> Self {
        Self {
            active: HashSet::new(),
            join_set: JoinSet::new(),
            summaries: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Spawns a worker into the pool.
    ///
    /// A worker id already running in the pool is skipped with a warning.
    pub fn spawn<T>(&mut self, worker: ProcessorWorker<T>)
    where
        T: Transform + Send + Sync + 'static,
    {
        let worker_id = worker.worker_id();
        if !self.active.insert(worker_id) {
            warn!(worker_id, "worker already exists in pool and is still running");
            return;
        }

        let span = info_span!("task", kind = %WorkerType::Processor { worker_id });
        self.join_set.spawn(
            async move {
                let result = worker.run().await;
                (worker_id, result)
            }
            .instrument(span),
        );

        debug!(worker_id, "spawned worker in pool");
    }

    /// Number of workers that have not completed yet.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Resolves once a worker failed or panicked.
    ///
    /// Workers that stop cleanly in the meantime are recorded for [`WorkerPool::wait_all`]. When
    /// every worker stopped without failing this never resolves. Safe to cancel.
    pub async fn wait_for_failure(&mut self) {
        if !self.errors.is_empty() {
            return;
        }

        while let Some(result) = self.join_set.join_next().await {
            if !self.record(result) {
                return;
            }
        }

        std::future::pending::<()>().await;
    }

    /// Waits for every worker in the pool to stop.
    ///
    /// Returns the summaries of all workers sorted by id, or the collected errors when any
    /// worker failed or panicked.
    pub async fn wait_all(&mut self) -> FlowResult<Vec<WorkerSummary>> {
        while let Some(result) = self.join_set.join_next().await {
            self.record(result);
        }

        // Panicked workers never report their id.
        self.active.clear();

        let errors = std::mem::take(&mut self.errors);
        if !errors.is_empty() {
            self.summaries.clear();
            return Err(errors.into());
        }

        let mut summaries = std::mem::take(&mut self.summaries);
        summaries.sort_by_key(|summary| summary.worker_id);

        Ok(summaries)
    }

    /// Records the outcome of a joined worker task, returning `false` when the worker failed.
    fn record(&mut self, result: Result<WorkerOutcome, JoinError>) -> bool {
        match result {
            Ok((worker_id, worker_result)) => {
                self.active.remove(&worker_id);

                match worker_result {
                    Ok(summary) => {
                        self.summaries.push(summary);
                        true
                    }
                    Err(err) => {
                        error!(worker_id, error = %err, "worker completed with error");
                        self.errors.push(err);
                        false
                    }
                }
            }
            Err(join_err) => {
                if join_err.is_cancelled() {
                    debug!("worker task was cancelled");
                    return true;
                }

                error!(error = %join_err, "worker task panicked");
                self.errors.push(flow_error!(
                    ErrorKind::WorkerPanic,
                    "Processor worker panicked",
                    join_err.to_string(),
                    source: join_err
                ));
                false
            }
        }
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::channel::BoundedChannel;
    use crate::concurrency::shutdown::{ShutdownRx, create_shutdown_channel};
    use crate::delay::FixedDelay;
    use crate::transform::MarkProcessed;
    use crate::types::{Payload, WorkItem};
    use bytes::Bytes;
    use flow_config::shared::CancellationMode;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct PanicOnThree;

    impl Transform for PanicOnThree {
        async fn transform(&self, item: &WorkItem) -> FlowResult<Payload> {
            assert_ne!(item.id(), 3, "item three is poisoned");
            Ok(item.payload().clone())
        }
    }

    fn spawn_workers<T>(
        pool: &mut WorkerPool,
        count: u16,
        transform: T,
        input: &BoundedChannel<WorkItem>,
        output: &BoundedChannel<WorkItem>,
        shutdown_rx: &ShutdownRx,
    ) where
        T: Transform + Clone + Send + Sync + 'static,
    {
        for worker_id in 0..count {
            pool.spawn(ProcessorWorker::new(
                worker_id,
                input.clone(),
                output.clone(),
                transform.clone(),
                Arc::new(FixedDelay::ZERO),
                CancellationMode::Deferred,
                shutdown_rx.clone(),
            ));
        }
    }

    async fn fill(channel: &BoundedChannel<WorkItem>, count: u64) {
        for id in 0..count {
            channel
                .put(WorkItem::new(id, Bytes::from_static(b"payload")))
                .await
                .unwrap();
        }
        channel.close();
    }

    #[tokio::test]
    async fn collects_summaries_of_all_workers() {
        let input = BoundedChannel::unbounded("raw");
        let output = BoundedChannel::unbounded("processed");
        fill(&input, 9).await;

        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let mut pool = WorkerPool::new();
        spawn_workers(&mut pool, 3, MarkProcessed, &input, &output, &shutdown_rx);
        assert_eq!(pool.active_count(), 3);

        let summaries = pool.wait_all().await.unwrap();

        assert_eq!(pool.active_count(), 0);
        let ids: Vec<_> = summaries.iter().map(|summary| summary.worker_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        let processed: u64 = summaries.iter().map(|summary| summary.processed).sum();
        assert_eq!(processed, 9);
        assert_eq!(output.stats().enqueued, 9);
    }

    #[tokio::test]
    async fn duplicate_worker_id_is_skipped() {
        let input = BoundedChannel::unbounded("raw");
        let output = BoundedChannel::unbounded("processed");
        fill(&input, 1).await;

        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let mut pool = WorkerPool::new();
        spawn_workers(&mut pool, 1, MarkProcessed, &input, &output, &shutdown_rx);
        spawn_workers(&mut pool, 1, MarkProcessed, &input, &output, &shutdown_rx);
        assert_eq!(pool.active_count(), 1);

        assert_eq!(pool.wait_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn worker_panic_is_reported() {
        let input = BoundedChannel::unbounded("raw");
        let output = BoundedChannel::unbounded("processed");
        fill(&input, 5).await;

        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let mut pool = WorkerPool::new();
        spawn_workers(&mut pool, 1, PanicOnThree, &input, &output, &shutdown_rx);

        let err = pool.wait_all().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WorkerPanic);
    }

    #[tokio::test]
    async fn failure_is_observed_before_remaining_workers_stop() {
        let input = BoundedChannel::unbounded("raw");
        let output = BoundedChannel::unbounded("processed");
        fill(&input, 5).await;

        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

        let mut pool = WorkerPool::new();
        spawn_workers(&mut pool, 1, PanicOnThree, &input, &output, &shutdown_rx);
        // The idle worker only stops once shutdown is requested.
        let idle_input = BoundedChannel::unbounded("idle");
        pool.spawn(ProcessorWorker::new(
            1,
            idle_input,
            output.clone(),
            MarkProcessed,
            Arc::new(FixedDelay::ZERO),
            CancellationMode::Deferred,
            shutdown_rx.clone(),
        ));
        assert_eq!(pool.active_count(), 2);

        pool.wait_for_failure().await;
        assert_eq!(input.stats().abandoned, 1);

        shutdown_tx.shutdown();
        let err = pool.wait_all().await.unwrap_err();
        assert_eq!(err.kinds(), vec![ErrorKind::WorkerPanic]);
    }
}
