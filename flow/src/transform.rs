use std::future::Future;

use crate::error::FlowResult;
use crate::types::{Payload, WorkItem};

/// Computes the output payload of a work item.
///
/// The worker keeps ownership of the item and settles its status from the result: `Ok` marks
/// it processed with the returned payload, `Err` marks it failed. Either way the item is
/// forwarded and its source delivery acknowledged.
pub trait Transform {
    fn transform(&self, item: &WorkItem) -> impl Future<Output = FlowResult<Payload>> + Send;
}

/// Default transform: keeps the payload unchanged, so processing only flips the status.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkProcessed;

impl Transform for MarkProcessed {
    async fn transform(&self, item: &WorkItem) -> FlowResult<Payload> {
        Ok(item.payload().clone())
    }
}
