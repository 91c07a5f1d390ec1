use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use conduit_queue::Delivery;
use conduit_store::{BlobWritten, ObjectStoreClient};
use conduit_types::{Locator, PointerMessage};

use crate::error::TriggerResult;
use crate::traits::{BlobHandler, MessageHandler};

/// What the queue reactor observed for one delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageReport {
    pub id: Uuid,
    pub label: Option<String>,
    pub delivery_count: u32,
    pub content: String,
    /// The pointed-to object, when the body is a pointer message.
    pub locator: Option<Locator>,
}

/// Logs every pointer message delivered on the queue.
///
/// Logging only, so redelivery is harmless.
#[derive(Clone, Debug, Default)]
pub struct QueueReactor;

impl QueueReactor {
    pub fn new() -> Self {
        Self
    }

    /// Decode a delivery. Bodies that are not pointer messages are still
    /// reported, without a locator.
    pub fn inspect(&self, delivery: &Delivery) -> MessageReport {
        let message = &delivery.message;
        let locator = match PointerMessage::from_json(&message.body).and_then(|p| p.locator()) {
            Ok(locator) => Some(locator),
            Err(e) => {
                debug!(id = %message.id, error = %e, "message body is not a pointer");
                None
            }
        };
        MessageReport {
            id: message.id,
            label: message.label.clone(),
            delivery_count: delivery.delivery_count,
            content: message.body_as_text(),
            locator,
        }
    }
}

#[async_trait]
impl MessageHandler for QueueReactor {
    async fn handle(&self, delivery: &Delivery) -> TriggerResult<()> {
        let report = self.inspect(delivery);
        info!(
            label = report.label.as_deref().unwrap_or("-"),
            id = %report.id,
            delivery_count = report.delivery_count,
            content = %report.content,
            "queue trigger processed message"
        );
        Ok(())
    }
}

/// What the storage reactor read for one write event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobReport {
    pub name: String,
    pub size: u64,
    pub content: String,
}

/// Reads and logs every object written to the monitored container.
#[derive(Clone, Debug)]
pub struct StorageReactor {
    client: ObjectStoreClient,
}

impl StorageReactor {
    pub fn new(client: ObjectStoreClient) -> Self {
        Self { client }
    }

    pub fn container(&self) -> &str {
        self.client.container()
    }

    /// Read the written object's full content as text.
    pub async fn read(&self, event: &BlobWritten) -> TriggerResult<BlobReport> {
        let content = self.client.read(&event.locator).await?;
        if content.object.size != event.size {
            warn!(
                name = %event.name,
                event_size = event.size,
                size = content.object.size,
                "object changed since the write event"
            );
        }
        Ok(BlobReport {
            name: content.object.name.clone(),
            size: content.object.size,
            content: content.into_text(),
        })
    }
}

#[async_trait]
impl BlobHandler for StorageReactor {
    async fn handle(&self, event: &BlobWritten) -> TriggerResult<()> {
        let report = self.read(event).await?;
        info!(
            name = %report.name,
            size = report.size,
            content = %report.content,
            "blob trigger processed object"
        );
        Ok(())
    }
}
