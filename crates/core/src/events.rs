//! Outbound event channels.
//!
//! Every subsystem owns one `EventBus`; subscribers attach with `subscribe`
//! and a bus without subscribers simply drops what it publishes.

use tokio::sync::broadcast;

#[derive(Clone)]
pub struct EventBus<E: Clone> {
    tx: broadcast::Sender<E>,
}

impl<E: Clone + Send + 'static> EventBus<E> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: E) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    /// Forward everything published here into `target` until the bus closes
    /// or `cancel` fires.
    pub fn forward_into(
        &self,
        target: EventBus<E>,
        cancel: tokio_util::sync::CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) => target.publish(event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!("Event forwarder lagged, {} event(s) dropped", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        })
    }
}
