use std::collections::BTreeMap;

/// Key/value metadata attached to a stored object.
///
/// Ordered so that sidecar files and debug output are stable.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key holding the submitting client's network address.
pub const REMOTE_IP_ADDRESS: &str = "RemoteIpAddress";

/// Content type of every object written by the ingestion path.
pub const CONTENT_TYPE_JSON: &str = "application/json";
