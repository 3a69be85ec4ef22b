use crate::traits::{PubSub, Subscription};
use async_trait::async_trait;
use relay_core::{Error, Result};
use relay_store::Queue;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

/// Default capacity of each subscription channel.
const DEFAULT_CAPACITY: usize = 64;

/// In-process bus implementation backed by bounded channels.
///
/// Every subscription gets its own channel; published queues are fanned out
/// to all live subscriptions. Dropped subscriptions are pruned on the next
/// publish.
pub struct MemoryPubSub {
    capacity: usize,
    senders: RwLock<Vec<mpsc::Sender<Queue>>>,
}

impl MemoryPubSub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            senders: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSub for MemoryPubSub {
    fn name(&self) -> &str {
        "memory"
    }

    async fn publish(&self, queue: Queue) -> Result<()> {
        let mut senders = self.senders.write().await;
        senders.retain(|sender| !sender.is_closed());

        if senders.is_empty() {
            return Err(Error::pubsub("No live subscription to deliver to"));
        }

        for sender in senders.iter() {
            sender
                .send(queue.clone())
                .await
                .map_err(|_| Error::pubsub("Subscription closed while delivering"))?;
        }

        debug!(
            jobs = queue.len(),
            subscriptions = senders.len(),
            "published queue"
        );
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.senders.write().await.push(sender);
        Ok(Subscription::new(receiver))
    }
}
