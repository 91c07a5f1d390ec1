use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single entry on the queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Time-ordered message identifier (UUID v7).
    pub id: Uuid,
    /// Optional correlation label; transport metadata only.
    pub label: Option<String>,
    pub body: Vec<u8>,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueMessage {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            id: Uuid::now_v7(),
            label: None,
            body,
            enqueued_at: Utc::now(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Body decoded as UTF-8; invalid sequences are replaced.
    pub fn body_as_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A message handed to a consumer, locked until completed or abandoned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub message: QueueMessage,
    /// 1 on first delivery, incremented by every abandon.
    pub delivery_count: u32,
    /// Identifies this particular delivery when settling it.
    pub lock_token: Uuid,
}
