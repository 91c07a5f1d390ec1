use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::locator::Locator;

/// Label attached to pointer messages on the queue. Consumers only log it.
pub const POINTER_LABEL: &str = "conduit.pointer";

/// Queue payload referencing a stored object by its locator.
///
/// Serialized as `{"BlobUri":"<locator>"}`. This is also the body of the
/// ingestion endpoint's success response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerMessage {
    #[serde(rename = "BlobUri")]
    pub locator: String,
}

impl PointerMessage {
    pub fn new(locator: &Locator) -> Self {
        Self {
            locator: locator.to_string(),
        }
    }

    /// Decode a pointer from a queue message body.
    pub fn from_json(body: &[u8]) -> Result<Self, TypeError> {
        serde_json::from_slice(body).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Parse the carried locator.
    pub fn locator(&self) -> Result<Locator, TypeError> {
        Locator::parse(&self.locator)
    }
}

impl From<&Locator> for PointerMessage {
    fn from(locator: &Locator) -> Self {
        Self::new(locator)
    }
}
