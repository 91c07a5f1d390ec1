use async_trait::async_trait;

use crate::error::QueueResult;
use crate::message::{Delivery, QueueMessage};

/// A single named queue with at-least-once delivery.
///
/// All implementations must satisfy these invariants:
/// - `send` returns only once the message is accepted (durably, for
///   persistent backends).
/// - A received message stays locked until it is completed or abandoned; it
///   is not handed to another consumer meanwhile.
/// - Abandoning makes the message ready again with `delivery_count + 1`.
/// - Completing twice, or settling an unknown lock, is an error.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Name of the queue.
    fn name(&self) -> &str;

    /// Enqueue one message.
    async fn send(&self, message: QueueMessage) -> QueueResult<()>;

    /// Wait for the next message and lock it.
    ///
    /// Returns `Err(QueueError::Closed)` once the queue is closed and empty.
    async fn receive(&self) -> QueueResult<Delivery>;

    /// Lock the next message if one is ready, without waiting.
    async fn try_receive(&self) -> QueueResult<Option<Delivery>>;

    /// Settle a delivery; the message will not be delivered again.
    async fn complete(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Release a delivery for redelivery.
    async fn abandon(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Messages not yet completed (ready plus in flight).
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting waits. Ready messages can still be drained.
    fn close(&self);
}
