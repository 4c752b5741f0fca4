//! Publishing side of the outbound bus.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::error::BusError;
use super::message::OutboundMessage;

/// One consolidated batch as seen by subscribers.
pub type MessageBatch = Arc<Vec<OutboundMessage>>;

/// Sink for consolidated outbound batches.
///
/// Implementations must deliver messages sharing a partition key in the order
/// they appear in the batch. No ordering is promised across keys.
#[async_trait]
pub trait MessagePublisher: Send + Sync + 'static {
    async fn publish(&self, batch: &[OutboundMessage]) -> Result<(), BusError>;
}

/// In-process bus fanning batches out to subscribers over a broadcast channel.
pub struct InMemoryBus {
    sender: broadcast::Sender<MessageBatch>,
    messages_published: AtomicU64,
}

impl InMemoryBus {
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            messages_published: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MessageBatch> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessagePublisher for InMemoryBus {
    async fn publish(&self, batch: &[OutboundMessage]) -> Result<(), BusError> {
        if batch.is_empty() {
            return Ok(());
        }

        let count = batch.len() as u64;
        match self.sender.send(Arc::new(batch.to_vec())) {
            Ok(receivers) => {
                tracing::debug!("Published {} messages to {} subscribers", count, receivers);
            }
            Err(_) => {
                tracing::debug!("Published {} messages with no active subscribers", count);
            }
        }

        self.messages_published.fetch_add(count, Ordering::Relaxed);
        Ok(())
    }
}
