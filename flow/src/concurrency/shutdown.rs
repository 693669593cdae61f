//! Broadcast shutdown signal shared by every pipeline task.
//!
//! The signal is a `watch` channel of `bool`, so a task that subscribes after shutdown was
//! requested still observes it, and a single call reaches every subscriber at once.

use tokio::sync::watch;

/// Transmitter side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Requests shutdown of every subscriber.
    ///
    /// Requesting shutdown more than once is harmless.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    /// Returns whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Creates a new receiver.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiver side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Returns whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once shutdown has been requested.
    ///
    /// Resolves immediately if it already was. Dropping every [`ShutdownTx`] also counts as a
    /// shutdown request, since nobody is left to coordinate the task. Cancel safe.
    pub async fn wait_for_shutdown(&mut self) {
        let _ = self.0.wait_for(|shutdown| *shutdown).await;
    }
}

/// Creates a new shutdown signal in the "running" state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_observes_shutdown() {
        let (tx, mut rx) = create_shutdown_channel();
        let mut late_rx = tx.subscribe();
        assert!(!rx.is_shutdown());

        let waiter = tokio::spawn(async move {
            rx.wait_for_shutdown().await;
        });

        tx.shutdown();
        waiter.await.unwrap();

        assert!(tx.is_shutdown());
        assert!(late_rx.is_shutdown());
        late_rx.wait_for_shutdown().await;
    }

    #[tokio::test]
    async fn dropping_the_transmitter_releases_waiters() {
        let (tx, mut rx) = create_shutdown_channel();
        drop(tx);

        rx.wait_for_shutdown().await;
    }
}
