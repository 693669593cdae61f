//! Core data types flowing through a pipeline.

use bytes::Bytes;
use std::fmt;

use crate::bail;
use crate::error::{ErrorKind, FlowResult};

/// Sequence number of a [`WorkItem`], unique within a pipeline run and assigned from 0.
pub type ItemId = u64;

/// Opaque payload carried by a [`WorkItem`].
pub type Payload = Bytes;

/// Processing status of a [`WorkItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemStatus {
    /// Produced by the generator and not yet handled by a worker.
    Raw,
    /// Transformed successfully by a worker.
    Processed,
    /// The transform failed; the item is still forwarded so that the aggregator count holds.
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Raw => "raw",
            ItemStatus::Processed => "processed",
            ItemStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of work handed from stage to stage.
///
/// Only the generator creates items, always as [`ItemStatus::Raw`]. The worker that dequeues an
/// item settles its status exactly once; any later status change is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    id: ItemId,
    status: ItemStatus,
    payload: Payload,
}

impl WorkItem {
    /// Creates a raw item.
    pub fn new(id: ItemId, payload: Payload) -> Self {
        Self {
            id,
            status: ItemStatus::Raw,
            payload,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Marks the item as processed and replaces its payload with the transform output.
    pub fn mark_processed(&mut self, payload: Payload) -> FlowResult<()> {
        self.settle(ItemStatus::Processed)?;
        self.payload = payload;

        Ok(())
    }

    /// Marks the item as failed, keeping its original payload.
    pub fn mark_failed(&mut self) -> FlowResult<()> {
        self.settle(ItemStatus::Failed)
    }

    fn settle(&mut self, status: ItemStatus) -> FlowResult<()> {
        if self.status != ItemStatus::Raw {
            bail!(
                ErrorKind::InvalidState,
                "Work item status already settled",
                format!(
                    "item {} is already {} and cannot become {}",
                    self.id, self.status, status
                )
            );
        }

        self.status = status;

        Ok(())
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{id: {}, status: {}}}", self.id, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_items_are_raw() {
        let item = WorkItem::new(3, Bytes::from_static(b"abc"));

        assert_eq!(item.id(), 3);
        assert_eq!(item.status(), ItemStatus::Raw);
        assert_eq!(item.payload().as_ref(), b"abc");
        assert_eq!(item.to_string(), "{id: 3, status: raw}");
    }

    #[test]
    fn processing_replaces_payload_once() {
        let mut item = WorkItem::new(0, Bytes::from_static(b"in"));
        item.mark_processed(Bytes::from_static(b"out")).unwrap();

        assert_eq!(item.status(), ItemStatus::Processed);
        assert_eq!(item.payload().as_ref(), b"out");

        let err = item.mark_processed(Bytes::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(item.payload().as_ref(), b"out");
    }

    #[test]
    fn failed_items_cannot_be_processed_later() {
        let mut item = WorkItem::new(1, Bytes::new());
        item.mark_failed().unwrap();

        assert_eq!(item.status(), ItemStatus::Failed);
        assert_eq!(
            item.mark_processed(Bytes::new()).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }
}
