#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use flow::bail;
use flow::delay::{FixedDelay, UniformDelay};
use flow::error::{ErrorKind, FlowResult};
use flow::pipeline::Pipeline;
use flow::transform::Transform;
use flow::types::{Payload, WorkItem};
use flow_config::shared::PipelineConfig;
use tokio::sync::watch;

/// Creates a pipeline whose generator and workers never sleep.
pub fn zero_delay_pipeline(config: PipelineConfig) -> Pipeline {
    Pipeline::new(config).with_delays(Arc::new(FixedDelay::ZERO), Arc::new(FixedDelay::ZERO))
}

/// Creates a pipeline with short random delays, enough to interleave workers.
pub fn jittered_pipeline(config: PipelineConfig) -> Pipeline {
    Pipeline::new(config).with_delays(
        Arc::new(UniformDelay::new(Duration::ZERO, Duration::from_millis(2))),
        Arc::new(UniformDelay::new(Duration::ZERO, Duration::from_millis(2))),
    )
}

/// Fails every item whose id is a multiple of `modulo`.
#[derive(Debug, Clone, Copy)]
pub struct FailEvery {
    pub modulo: u64,
}

impl Transform for FailEvery {
    async fn transform(&self, item: &WorkItem) -> FlowResult<Payload> {
        if item.id() % self.modulo == 0 {
            bail!(
                ErrorKind::TransformFailed,
                "Item rejected by test transform",
                format!("item {} is a multiple of {}", item.id(), self.modulo)
            );
        }

        Ok(item.payload().clone())
    }
}

/// Panics on the item with id `item_id`.
#[derive(Debug, Clone, Copy)]
pub struct PanicOn {
    pub item_id: u64,
}

impl Transform for PanicOn {
    async fn transform(&self, item: &WorkItem) -> FlowResult<Payload> {
        assert_ne!(item.id(), self.item_id, "poisoned item reached the transform");

        Ok(item.payload().clone())
    }
}

/// Controls a set of [`GatedTransform`]s.
///
/// Every transform blocks until the gate is opened, which lets tests hold workers in the middle
/// of processing an item.
#[derive(Debug)]
pub struct Gate {
    open_tx: watch::Sender<bool>,
    started_tx: Arc<watch::Sender<usize>>,
}

impl Gate {
    pub fn new() -> Self {
        let (open_tx, _) = watch::channel(false);
        let (started_tx, _) = watch::channel(0);

        Self {
            open_tx,
            started_tx: Arc::new(started_tx),
        }
    }

    pub fn transform(&self) -> GatedTransform {
        GatedTransform {
            open_rx: self.open_tx.subscribe(),
            started_tx: self.started_tx.clone(),
        }
    }

    pub fn open(&self) {
        self.open_tx.send_replace(true);
    }

    /// Waits until `count` transforms are blocked on the gate or went through it.
    pub async fn wait_started(&self, count: usize) {
        let mut started_rx = self.started_tx.subscribe();
        let _ = started_rx.wait_for(|started| *started >= count).await;
    }
}

#[derive(Debug, Clone)]
pub struct GatedTransform {
    open_rx: watch::Receiver<bool>,
    started_tx: Arc<watch::Sender<usize>>,
}

impl Transform for GatedTransform {
    async fn transform(&self, item: &WorkItem) -> FlowResult<Payload> {
        self.started_tx.send_modify(|started| *started += 1);

        let mut open_rx = self.open_rx.clone();
        if open_rx.wait_for(|open| *open).await.is_err() {
            bail!(ErrorKind::TransformFailed, "Gate was dropped before opening");
        }

        Ok(item.payload().clone())
    }
}
