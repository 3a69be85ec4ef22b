use async_trait::async_trait;
use relay_core::Result;
use relay_store::Queue;
use tokio::sync::mpsc;

/// Realtime bus boundary.
///
/// Publishing sends a [`Queue`] of freshly acknowledged jobs; a subscription
/// receives queues as they are published. Delivery is to a single receiving
/// instance per subscription, which is what lets realtime work skip the
/// semaphore.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// String representation of the bus implementation.
    ///
    /// Example: "memory"
    fn name(&self) -> &str;

    /// Publish a queue. Returns after the queue has been handed to the bus,
    /// or failed to be.
    async fn publish(&self, queue: Queue) -> Result<()>;

    /// Open a subscription receiving every queue published after this call.
    async fn subscribe(&self) -> Result<Subscription>;
}

/// A stream of published queues.
pub struct Subscription {
    receiver: mpsc::Receiver<Queue>,
}

impl Subscription {
    /// Wrap a channel receiver into a subscription
    pub fn new(receiver: mpsc::Receiver<Queue>) -> Self {
        Self { receiver }
    }

    /// Receive the next queue, waiting until one is published. Returns None
    /// once the bus is shut down.
    pub async fn recv(&mut self) -> Option<Queue> {
        self.receiver.recv().await
    }
}
