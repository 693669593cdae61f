//! Concurrency primitives used to coordinate pipeline stages.
//!
//! - [`channel`] provides the FIFO hand-off between stages together with the completion
//!   accounting (`put`, `get`, `ack`, `drain_wait`) the controller relies on to know when all
//!   in-flight work has finished.
//! - [`shutdown`] provides the broadcast signal the controller uses to stop the generator and
//!   every worker at the same time.
//!
//! Both primitives are safe to use from any number of concurrent tasks. Operations that wait
//! (`put` on a full channel, `get` on an empty one, `wait_for_shutdown`) can be raced inside
//! `tokio::select!` without losing items.

pub mod channel;
pub mod shutdown;
