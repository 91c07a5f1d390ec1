use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use conduit_types::{Locator, LocatorScheme, Metadata};

use crate::error::{StoreError, StoreResult};
use crate::events::{WriteEvents, WriteNotifier};
use crate::object::{ObjectContent, ObjectProperties, StoredObject};
use crate::traits::ObjectStore;

/// Content type reported for objects written without a sidecar.
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Properties persisted next to each object.
///
/// On-disk layout for object `name` in `container`:
/// ```text
/// {root}/{container}/{name}              object content
/// {root}/{container}/.{name}.meta.json   content type, metadata, created_at
/// ```
#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    content_type: String,
    metadata: Metadata,
    created_at: DateTime<Utc>,
}

fn sidecar_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!(".{name}.meta.json"))
}

/// Write `bytes` to `target` through a temp file in the same directory and an
/// atomic rename, so readers never observe a partial object.
fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Filesystem object store: one directory per container under a root.
///
/// The sidecar is written before the content, so any visible object has its
/// properties available. Write events are broadcast to subscribers of this
/// instance only.
pub struct FsObjectStore {
    root: PathBuf,
    notifier: WriteNotifier,
}

impl FsObjectStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        let root = fs::canonicalize(root)?;
        info!(root = %root.display(), "filesystem object store opened");
        Ok(Self {
            root,
            notifier: WriteNotifier::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn container_dir(&self, container: &str) -> StoreResult<PathBuf> {
        // Validates the container as a locator segment.
        Locator::file(&self.root, container, "_")?;
        Ok(self.root.join(container))
    }

    fn check_locator(&self, locator: &Locator) -> StoreResult<PathBuf> {
        let foreign = || StoreError::ForeignLocator {
            locator: locator.clone(),
            backend: LocatorScheme::File,
        };
        if locator.root() != Some(self.root.as_path()) {
            return Err(foreign());
        }
        locator.to_path().ok_or_else(foreign)
    }
}

async fn blocking<T, F>(f: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn scheme(&self) -> LocatorScheme {
        LocatorScheme::File
    }

    async fn create_container(&self, container: &str) -> StoreResult<bool> {
        let dir = self.container_dir(container)?;
        blocking(move || {
            if dir.is_dir() {
                return Ok(false);
            }
            fs::create_dir_all(&dir)?;
            Ok(true)
        })
        .await
    }

    async fn container_exists(&self, container: &str) -> StoreResult<bool> {
        let dir = self.container_dir(container)?;
        blocking(move || Ok(dir.is_dir())).await
    }

    async fn put(
        &self,
        container: &str,
        name: &str,
        data: &[u8],
        properties: &ObjectProperties,
    ) -> StoreResult<StoredObject> {
        let locator = Locator::file(&self.root, container, name)?;
        let dir = self.root.join(container);
        let object = StoredObject {
            name: name.to_string(),
            container: container.to_string(),
            locator,
            content_type: properties.content_type.clone(),
            metadata: properties.metadata.clone(),
            size: data.len() as u64,
            created_at: Utc::now(),
        };
        let sidecar = serde_json::to_vec_pretty(&Sidecar {
            content_type: object.content_type.clone(),
            metadata: object.metadata.clone(),
            created_at: object.created_at,
        })
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let data = data.to_vec();
        let name = name.to_string();
        let container = container.to_string();
        blocking(move || {
            if !dir.is_dir() {
                return Err(StoreError::ContainerNotFound(container));
            }
            write_atomic(&dir, &sidecar_path(&dir, &name), &sidecar)?;
            write_atomic(&dir, &dir.join(&name), &data)?;
            Ok(())
        })
        .await?;

        debug!(locator = %object.locator, size = object.size, "object written");
        self.notifier.notify(&object);
        Ok(object)
    }

    async fn get(&self, locator: &Locator) -> StoreResult<Option<ObjectContent>> {
        let path = self.check_locator(locator)?;
        let locator = locator.clone();
        blocking(move || {
            let data = match fs::read(&path) {
                Ok(data) => data,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let dir = path.parent().unwrap_or(Path::new("/"));
            let sidecar = match fs::read(sidecar_path(dir, locator.name())) {
                Ok(bytes) => serde_json::from_slice::<Sidecar>(&bytes)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?,
                Err(e) if e.kind() == io::ErrorKind::NotFound => Sidecar {
                    content_type: FALLBACK_CONTENT_TYPE.into(),
                    metadata: Metadata::new(),
                    created_at: fs::metadata(&path)?.modified()?.into(),
                },
                Err(e) => return Err(e.into()),
            };
            Ok(Some(ObjectContent {
                object: StoredObject {
                    name: locator.name().to_string(),
                    container: locator.container().to_string(),
                    size: data.len() as u64,
                    locator,
                    content_type: sidecar.content_type,
                    metadata: sidecar.metadata,
                    created_at: sidecar.created_at,
                },
                data,
            }))
        })
        .await
    }

    fn subscribe(&self) -> WriteEvents {
        self.notifier.subscribe()
    }
}

impl std::fmt::Debug for FsObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsObjectStore")
            .field("root", &self.root)
            .finish()
    }
}
