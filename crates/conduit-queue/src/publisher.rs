use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::error::{QueueError, QueueResult};
use crate::message::QueueMessage;
use crate::traits::QueueTransport;

/// Serializes values to JSON and sends them to one queue.
#[derive(Clone)]
pub struct QueuePublisher {
    transport: Arc<dyn QueueTransport>,
    label: Option<String>,
}

impl QueuePublisher {
    pub fn new(transport: Arc<dyn QueueTransport>) -> Self {
        Self {
            transport,
            label: None,
        }
    }

    /// Attach `label` to every message sent by this publisher.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn queue_name(&self) -> &str {
        self.transport.name()
    }

    pub fn transport(&self) -> &Arc<dyn QueueTransport> {
        &self.transport
    }

    /// Serialize `message` as JSON and enqueue it.
    ///
    /// Returns the id of the enqueued message. A value serializing to `null`
    /// is rejected with [`QueueError::EmptyMessage`] and nothing is sent.
    pub async fn push<M>(&self, message: &M) -> QueueResult<Uuid>
    where
        M: Serialize + ?Sized + Sync,
    {
        let value =
            serde_json::to_value(message).map_err(|e| QueueError::Serialization(e.to_string()))?;
        if value.is_null() {
            return Err(QueueError::EmptyMessage);
        }
        let body =
            serde_json::to_vec(&value).map_err(|e| QueueError::Serialization(e.to_string()))?;

        let mut queued = QueueMessage::new(body);
        if let Some(label) = &self.label {
            queued = queued.with_label(label.clone());
        }
        let id = queued.id;
        self.transport.send(queued).await?;
        debug!(queue = %self.transport.name(), %id, "message published");
        Ok(id)
    }
}

impl std::fmt::Debug for QueuePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuePublisher")
            .field("queue", &self.transport.name())
            .field("label", &self.label)
            .finish()
    }
}
