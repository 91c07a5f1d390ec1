use std::sync::Arc;

use tracing::debug;

use conduit_types::{Locator, Metadata};

use crate::error::{StoreError, StoreResult};
use crate::object::{ObjectContent, ObjectProperties, StoredObject};
use crate::traits::ObjectStore;

/// Object store client bound to one container.
///
/// Writes go into the bound container; reads resolve any locator the backend
/// serves. No retries are performed here.
#[derive(Clone)]
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
    container: String,
}

impl ObjectStoreClient {
    /// Bind a client to `container`. Container names are case-insensitive and
    /// normalized to lower case.
    pub fn new(store: Arc<dyn ObjectStore>, container: &str) -> Self {
        Self {
            store,
            container: container.to_lowercase(),
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Write `data` under `name` with the given content type and metadata.
    pub async fn create(
        &self,
        name: &str,
        data: &[u8],
        content_type: &str,
        metadata: Option<Metadata>,
    ) -> StoreResult<StoredObject> {
        let properties = ObjectProperties::new(content_type, metadata);
        let object = self
            .store
            .put(&self.container, name, data, &properties)
            .await?;
        debug!(
            container = %self.container,
            name = %object.name,
            size = object.size,
            "created object"
        );
        Ok(object)
    }

    /// Write `text` encoded as UTF-8.
    pub async fn create_text(
        &self,
        name: &str,
        text: &str,
        content_type: &str,
        metadata: Option<Metadata>,
    ) -> StoreResult<StoredObject> {
        self.create(name, text.as_bytes(), content_type, metadata)
            .await
    }

    /// Read an object and its content by locator.
    pub async fn read(&self, locator: &Locator) -> StoreResult<ObjectContent> {
        self.store
            .get(locator)
            .await?
            .ok_or_else(|| StoreError::NotFound(locator.clone()))
    }

    /// Read an object's full content as UTF-8 text.
    pub async fn read_as_text(&self, locator: &Locator) -> StoreResult<String> {
        Ok(self.read(locator).await?.into_text())
    }

    /// Provision the bound container if it does not exist yet.
    pub async fn ensure_container(&self) -> StoreResult<bool> {
        self.store.create_container(&self.container).await
    }
}

impl std::fmt::Debug for ObjectStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreClient")
            .field("scheme", &self.store.scheme())
            .field("container", &self.container)
            .finish()
    }
}
