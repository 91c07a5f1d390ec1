use std::net::{Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Secret key holding the ingest endpoint's expected `Basic` parameter.
pub const DEFAULT_CREDENTIAL_KEY: &str = "basic-auth.ingest";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Request bodies above this size are rejected with 413.
    pub max_body_bytes: usize,
    /// Key looked up in the secret source for the ingest credential.
    pub credential_key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 7071)),
            max_body_bytes: 4 * 1024 * 1024,
            credential_key: DEFAULT_CREDENTIAL_KEY.into(),
        }
    }
}
