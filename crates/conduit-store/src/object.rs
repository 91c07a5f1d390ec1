use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use conduit_types::{Locator, Metadata};

/// Content type and metadata attached to an object at write time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectProperties {
    pub content_type: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl ObjectProperties {
    pub fn new(content_type: impl Into<String>, metadata: Option<Metadata>) -> Self {
        Self {
            content_type: content_type.into(),
            metadata: metadata.unwrap_or_default(),
        }
    }
}

/// Descriptor of an object that has been durably written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub name: String,
    pub container: String,
    pub locator: Locator,
    pub content_type: String,
    pub metadata: Metadata,
    /// Content length in bytes.
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// A stored object together with its full content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectContent {
    pub object: StoredObject,
    pub data: Vec<u8>,
}

impl ObjectContent {
    /// Content decoded as UTF-8; invalid sequences are replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    pub fn into_text(self) -> String {
        match String::from_utf8(self.data) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }
}
