use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::client::ObjectStoreClient;
use crate::error::{StoreError, StoreResult};
use crate::fs::FsObjectStore;
use crate::memory::InMemoryObjectStore;
use crate::traits::ObjectStore;

/// Storage connection settings.
///
/// `connection` selects the backend:
/// - `memory:` -- process-local [`InMemoryObjectStore`]
/// - `file://<dir>` or a plain directory path -- [`FsObjectStore`] rooted there
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub connection: String,
    pub container: String,
    /// Provision the container at startup instead of requiring it to exist.
    pub create_container: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection: "memory:".into(),
            container: "payloads".into(),
            create_container: false,
        }
    }
}

impl StoreConfig {
    /// Open the backend named by `connection`.
    pub fn open_store(&self) -> StoreResult<Arc<dyn ObjectStore>> {
        let connection = self.connection.trim();
        if connection.is_empty() {
            return Err(StoreError::InvalidConnection(self.connection.clone()));
        }
        if connection == "memory:" || connection == "memory://" {
            // The in-memory container is provisioned here; nothing else can.
            return Ok(Arc::new(InMemoryObjectStore::with_container(
                &self.container.to_lowercase(),
            )));
        }
        let root = match connection.split_once("://") {
            Some(("file", path)) => PathBuf::from(path),
            Some(_) => return Err(StoreError::InvalidConnection(self.connection.clone())),
            None => PathBuf::from(connection),
        };
        Ok(Arc::new(FsObjectStore::open(root)?))
    }

    /// Open the backend and bind a client to the configured container.
    pub async fn connect(&self) -> StoreResult<ObjectStoreClient> {
        let client = ObjectStoreClient::new(self.open_store()?, &self.container);
        if self.create_container {
            client.ensure_container().await?;
        }
        Ok(client)
    }
}
