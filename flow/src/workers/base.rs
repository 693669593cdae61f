use std::fmt;
use std::future::Future;

use crate::error::FlowResult;

/// Identifier of a processing worker inside a pool.
pub type WorkerId = u16;

/// Classification of pipeline tasks, used for logging and error reporting.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WorkerType {
    /// Task producing raw items.
    Generator,
    /// Task transforming raw items into processed ones.
    Processor {
        /// Position of the worker inside its pool.
        worker_id: WorkerId,
    },
    /// Task consuming processed items.
    Aggregator,
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerType::Generator => f.write_str("generator"),
            WorkerType::Processor { worker_id } => write!(f, "processor-{worker_id}"),
            WorkerType::Aggregator => f.write_str("aggregator"),
        }
    }
}

/// A pipeline stage that runs as a background task once started.
///
/// `H` is the handle returned on start and `S` the state observable through it.
pub trait Worker<H, S>
where
    H: WorkerHandle<S>,
{
    /// Spawns the task and returns immediately with its handle.
    fn start(self) -> H;
}

/// Handle to a running pipeline task.
pub trait WorkerHandle<S> {
    /// Value produced by the task when it completes.
    type Output;

    /// Returns a snapshot of the task progress.
    ///
    /// The snapshot may be stale as soon as it is returned.
    fn state(&self) -> S;

    /// Waits for the task to complete, consuming the handle.
    fn wait(self) -> impl Future<Output = FlowResult<Self::Output>> + Send;
}
