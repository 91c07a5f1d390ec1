use async_trait::async_trait;

use conduit_queue::Delivery;
use conduit_store::BlobWritten;

use crate::error::TriggerResult;

/// Invoked once per queue delivery. Must tolerate redelivery.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> TriggerResult<()>;
}

/// Invoked once per storage-write event in the monitored container.
#[async_trait]
pub trait BlobHandler: Send + Sync {
    async fn handle(&self, event: &BlobWritten) -> TriggerResult<()>;
}
