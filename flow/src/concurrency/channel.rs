//! FIFO hand-off channel with explicit completion accounting.
//!
//! Every item put on a [`BoundedChannel`] increments a *pending* counter which only goes back
//! down when the consumer settles the matching delivery, either with [`BoundedChannel::ack`]
//! once it is completely done with the item, or with [`BoundedChannel::abandon`] when the item
//! is given up. [`BoundedChannel::drain_wait`] resolves when the counter reaches zero.
//!
//! A consumer that calls [`BoundedChannel::get`] and never settles the delivery keeps the
//! counter above zero forever, so `drain_wait` never returns. This is intentional:
//! [`BoundedChannel::drain_wait_timeout`] turns such an accounting bug into an
//! [`ErrorKind::AccountingDeadlock`] error instead of a silent hang.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, FlowResult};

/// Identifier of a single [`BoundedChannel::get`], used to settle it.
pub type DeliveryId = u64;

/// An item handed out by [`BoundedChannel::get`].
///
/// The consumer owns `item` and must settle `id` exactly once.
#[derive(Debug)]
pub struct Delivery<T> {
    pub id: DeliveryId,
    pub item: T,
}

/// Point-in-time counters of a [`BoundedChannel`].
///
/// `pending` always equals `queued + outstanding` and
/// `enqueued - acknowledged - abandoned`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Items ever put on the channel.
    pub enqueued: u64,
    /// Items ever handed out by `get`.
    pub delivered: u64,
    /// Deliveries settled with `ack`.
    pub acknowledged: u64,
    /// Items settled with `abandon` or `abandon_queued`.
    pub abandoned: u64,
    /// Items waiting in the queue.
    pub queued: usize,
    /// Deliveries handed out and not yet settled.
    pub outstanding: usize,
    /// Items not yet settled, queued or outstanding.
    pub pending: usize,
}

#[derive(Debug, Clone, Copy)]
enum Settlement {
    Acknowledged,
    Abandoned,
}

struct Inner<T> {
    queue: VecDeque<T>,
    outstanding: HashSet<DeliveryId>,
    next_delivery_id: DeliveryId,
    closed: bool,
    enqueued: u64,
    delivered: u64,
    acknowledged: u64,
    abandoned: u64,
}

struct Shared<T> {
    name: &'static str,
    capacity: Option<NonZeroUsize>,
    inner: Mutex<Inner<T>>,
    /// One permit per queued item.
    items: Semaphore,
    /// One permit per free slot, absent for unbounded channels.
    slots: Option<Semaphore>,
    /// Unsettled item count. Only modified while `inner` is locked.
    pending: watch::Sender<usize>,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        // The critical sections never panic halfway through an update.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Multi-producer multi-consumer FIFO channel with completion accounting.
///
/// Items are delivered in enqueue order to whichever consumer asks first. Cloning the channel
/// yields another handle to the same queue.
pub struct BoundedChannel<T> {
    shared: Arc<Shared<T>>,
}

impl<T> BoundedChannel<T> {
    /// Creates a channel holding at most `capacity` queued items, or unbounded when `None`.
    pub fn new(name: &'static str, capacity: Option<NonZeroUsize>) -> Self {
        let (pending, _) = watch::channel(0);

        Self {
            shared: Arc::new(Shared {
                name,
                capacity,
                inner: Mutex::new(Inner {
                    queue: VecDeque::new(),
                    outstanding: HashSet::new(),
                    next_delivery_id: 0,
                    closed: false,
                    enqueued: 0,
                    delivered: 0,
                    acknowledged: 0,
                    abandoned: 0,
                }),
                items: Semaphore::new(0),
                slots: capacity.map(|capacity| Semaphore::new(capacity.get())),
                pending,
            }),
        }
    }

    /// Creates an unbounded channel.
    pub fn unbounded(name: &'static str) -> Self {
        Self::new(name, None)
    }

    /// Creates a channel holding at most `capacity` queued items.
    pub fn bounded(name: &'static str, capacity: NonZeroUsize) -> Self {
        Self::new(name, Some(capacity))
    }

    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    pub fn capacity(&self) -> Option<NonZeroUsize> {
        self.shared.capacity
    }

    /// Enqueues `item`, waiting for a free slot if the channel is bounded and full.
    ///
    /// Cancelling the returned future before it completes leaves the channel untouched.
    /// Fails with [`ErrorKind::ChannelClosed`] once the channel is closed.
    pub async fn put(&self, item: T) -> FlowResult<()> {
        if let Some(slots) = &self.shared.slots {
            match slots.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => bail!(
                    ErrorKind::ChannelClosed,
                    "Cannot put on a closed channel",
                    self.shared.name
                ),
            }
        }

        {
            let mut inner = self.shared.lock();
            if inner.closed {
                if let Some(slots) = &self.shared.slots {
                    slots.add_permits(1);
                }
                bail!(
                    ErrorKind::ChannelClosed,
                    "Cannot put on a closed channel",
                    self.shared.name
                );
            }

            // Pending goes up before the item becomes visible to consumers.
            self.shared.pending.send_modify(|pending| *pending += 1);
            inner.queue.push_back(item);
            inner.enqueued += 1;
        }

        self.shared.items.add_permits(1);

        Ok(())
    }

    /// Waits for the next item.
    ///
    /// Returns `None` once the channel is closed and every queued item has been handed out.
    /// Cancelling the returned future before it completes does not consume an item.
    pub async fn get(&self) -> Option<Delivery<T>> {
        loop {
            let semaphore_closed = match self.shared.items.acquire().await {
                Ok(permit) => {
                    permit.forget();
                    false
                }
                Err(_) => true,
            };

            let mut inner = self.shared.lock();
            if let Some(item) = inner.queue.pop_front() {
                let id = inner.next_delivery_id;
                inner.next_delivery_id += 1;
                inner.outstanding.insert(id);
                inner.delivered += 1;
                drop(inner);

                if let Some(slots) = &self.shared.slots {
                    slots.add_permits(1);
                }

                return Some(Delivery { id, item });
            }

            if semaphore_closed || inner.closed {
                return None;
            }

            // The permit belonged to an item settled by `abandon_queued`.
        }
    }

    /// Marks delivery `id` as fully handled.
    ///
    /// Fails with [`ErrorKind::DuplicateAck`] when `id` was already settled or never handed out.
    pub fn ack(&self, id: DeliveryId) -> FlowResult<()> {
        self.settle(id, Settlement::Acknowledged)
    }

    /// Gives up delivery `id` without processing it.
    ///
    /// Settles the delivery like [`BoundedChannel::ack`] does, but counts it as abandoned.
    pub fn abandon(&self, id: DeliveryId) -> FlowResult<()> {
        self.settle(id, Settlement::Abandoned)
    }

    /// Removes every queued item, counting each one as abandoned, and returns them in order.
    pub fn abandon_queued(&self) -> Vec<T> {
        let mut inner = self.shared.lock();
        let items: Vec<T> = inner.queue.drain(..).collect();
        if items.is_empty() {
            return items;
        }

        inner.abandoned += items.len() as u64;
        self.shared
            .pending
            .send_modify(|pending| *pending -= items.len());
        drop(inner);

        if let Some(slots) = &self.shared.slots {
            slots.add_permits(items.len());
        }

        debug!(
            channel = self.shared.name,
            count = items.len(),
            "abandoned queued items"
        );

        items
    }

    /// Closes the channel.
    ///
    /// Further puts fail, blocked producers are woken with an error, and consumers keep
    /// receiving the items that are still queued before observing `None`.
    pub fn close(&self) {
        {
            let mut inner = self.shared.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
        }

        self.shared.items.close();
        if let Some(slots) = &self.shared.slots {
            slots.close();
        }

        debug!(channel = self.shared.name, "channel closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Waits until every item ever put on the channel has been settled.
    pub async fn drain_wait(&self) {
        let mut pending_rx = self.shared.pending.subscribe();
        // The sender lives inside the channel, so it outlives this receiver.
        let _ = pending_rx.wait_for(|pending| *pending == 0).await;
    }

    /// Like [`BoundedChannel::drain_wait`], but fails with [`ErrorKind::AccountingDeadlock`]
    /// when the channel has not drained within `deadline`.
    pub async fn drain_wait_timeout(&self, deadline: Duration) -> FlowResult<()> {
        if tokio::time::timeout(deadline, self.drain_wait())
            .await
            .is_ok()
        {
            return Ok(());
        }

        let stats = self.stats();
        bail!(
            ErrorKind::AccountingDeadlock,
            "Channel did not drain before the deadline",
            format!(
                "channel '{}' still has {} pending items ({} queued, {} delivered but never settled) after {:?}",
                self.shared.name, stats.pending, stats.queued, stats.outstanding, deadline
            )
        );
    }

    /// Returns a snapshot of the channel counters.
    pub fn stats(&self) -> ChannelStats {
        let inner = self.shared.lock();

        ChannelStats {
            enqueued: inner.enqueued,
            delivered: inner.delivered,
            acknowledged: inner.acknowledged,
            abandoned: inner.abandoned,
            queued: inner.queue.len(),
            outstanding: inner.outstanding.len(),
            pending: *self.shared.pending.borrow(),
        }
    }

    fn settle(&self, id: DeliveryId, settlement: Settlement) -> FlowResult<()> {
        let mut inner = self.shared.lock();
        if !inner.outstanding.remove(&id) {
            bail!(
                ErrorKind::DuplicateAck,
                "Delivery is not outstanding",
                format!(
                    "delivery {id} on channel '{}' was already settled or never handed out",
                    self.shared.name
                )
            );
        }

        match settlement {
            Settlement::Acknowledged => inner.acknowledged += 1,
            Settlement::Abandoned => inner.abandoned += 1,
        }
        self.shared.pending.send_modify(|pending| *pending -= 1);

        Ok(())
    }
}

impl<T> Clone for BoundedChannel<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> fmt::Debug for BoundedChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedChannel")
            .field("name", &self.shared.name)
            .field("capacity", &self.shared.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}
