use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use conduit_types::{Locator, LocatorScheme};

use crate::error::{StoreError, StoreResult};
use crate::events::{WriteEvents, WriteNotifier};
use crate::object::{ObjectContent, ObjectProperties, StoredObject};
use crate::traits::ObjectStore;

type Container = HashMap<String, ObjectContent>;

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. Containers and their objects are held
/// behind a `RwLock` for safe concurrent access. Objects are cloned on
/// read/write.
pub struct InMemoryObjectStore {
    containers: RwLock<HashMap<String, Container>>,
    notifier: WriteNotifier,
}

impl InMemoryObjectStore {
    /// Create a new store with no containers.
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            notifier: WriteNotifier::default(),
        }
    }

    /// Create a store with one provisioned container.
    pub fn with_container(container: &str) -> Self {
        let store = Self::new();
        store
            .containers
            .write()
            .expect("lock poisoned")
            .insert(container.to_string(), Container::new());
        store
    }

    /// Number of objects across all containers.
    pub fn len(&self) -> usize {
        self.containers
            .read()
            .expect("lock poisoned")
            .values()
            .map(HashMap::len)
            .sum()
    }

    /// Returns `true` if no container holds an object.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted object names in a container.
    pub fn names(&self, container: &str) -> Vec<String> {
        let map = self.containers.read().expect("lock poisoned");
        let mut names: Vec<String> = map
            .get(container)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn scheme(&self) -> LocatorScheme {
        LocatorScheme::Memory
    }

    async fn create_container(&self, container: &str) -> StoreResult<bool> {
        // Validates the container as a locator segment.
        Locator::memory(container, "_")?;
        let mut map = self.containers.write().expect("lock poisoned");
        if map.contains_key(container) {
            return Ok(false);
        }
        map.insert(container.to_string(), Container::new());
        Ok(true)
    }

    async fn container_exists(&self, container: &str) -> StoreResult<bool> {
        Ok(self
            .containers
            .read()
            .expect("lock poisoned")
            .contains_key(container))
    }

    async fn put(
        &self,
        container: &str,
        name: &str,
        data: &[u8],
        properties: &ObjectProperties,
    ) -> StoreResult<StoredObject> {
        let locator = Locator::memory(container, name)?;
        let object = StoredObject {
            name: name.to_string(),
            container: container.to_string(),
            locator,
            content_type: properties.content_type.clone(),
            metadata: properties.metadata.clone(),
            size: data.len() as u64,
            created_at: Utc::now(),
        };

        {
            let mut map = self.containers.write().expect("lock poisoned");
            let objects = map
                .get_mut(container)
                .ok_or_else(|| StoreError::ContainerNotFound(container.to_string()))?;
            objects.insert(
                name.to_string(),
                ObjectContent {
                    object: object.clone(),
                    data: data.to_vec(),
                },
            );
        }

        debug!(locator = %object.locator, size = object.size, "object written");
        self.notifier.notify(&object);
        Ok(object)
    }

    async fn get(&self, locator: &Locator) -> StoreResult<Option<ObjectContent>> {
        if locator.scheme() != LocatorScheme::Memory {
            return Err(StoreError::ForeignLocator {
                locator: locator.clone(),
                backend: LocatorScheme::Memory,
            });
        }
        let map = self.containers.read().expect("lock poisoned");
        Ok(map
            .get(locator.container())
            .and_then(|objects| objects.get(locator.name()))
            .cloned())
    }

    fn subscribe(&self) -> WriteEvents {
        self.notifier.subscribe()
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let containers = self.containers.read().expect("lock poisoned").len();
        f.debug_struct("InMemoryObjectStore")
            .field("container_count", &containers)
            .field("object_count", &self.len())
            .finish()
    }
}
