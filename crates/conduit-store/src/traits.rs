use async_trait::async_trait;

use conduit_types::{Locator, LocatorScheme};

use crate::error::StoreResult;
use crate::events::WriteEvents;
use crate::object::{ObjectContent, ObjectProperties, StoredObject};

/// Container-scoped object store.
///
/// All implementations must satisfy these invariants:
/// - `put` returns only once the object is durable for that backend, and only
///   then broadcasts a write event.
/// - `put` into a container that does not exist fails with
///   [`StoreError::ContainerNotFound`](crate::StoreError::ContainerNotFound).
/// - `get` resolves purely from the locator; no container context is needed.
/// - Stores never interpret object contents.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Locator scheme this backend serves.
    fn scheme(&self) -> LocatorScheme;

    /// Provision a container. Returns `true` if it was newly created.
    async fn create_container(&self, container: &str) -> StoreResult<bool>;

    /// Check whether a container has been provisioned.
    async fn container_exists(&self, container: &str) -> StoreResult<bool>;

    /// Write `data` under `container/name` and return the stored descriptor.
    async fn put(
        &self,
        container: &str,
        name: &str,
        data: &[u8],
        properties: &ObjectProperties,
    ) -> StoreResult<StoredObject>;

    /// Read an object by locator.
    ///
    /// Returns `Ok(None)` if the locator is well-formed for this store but no
    /// object exists there.
    async fn get(&self, locator: &Locator) -> StoreResult<Option<ObjectContent>>;

    /// Subscribe to write events from this store.
    fn subscribe(&self) -> WriteEvents;
}
