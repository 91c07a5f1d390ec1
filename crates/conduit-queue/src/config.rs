use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{QueueError, QueueResult};
use crate::file::{FileQueue, DEFAULT_COMPACT_THRESHOLD};
use crate::journal::{JournalConfig, SyncMode};
use crate::memory::InMemoryQueue;
use crate::traits::QueueTransport;

/// Where the pointer queue lives and how it is journaled.
///
/// `connection` selects the backend:
/// - `memory:` -- an [`InMemoryQueue`]
/// - `file://<dir>` or a plain path -- a [`FileQueue`] journaled under `<dir>`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub connection: String,
    pub name: String,
    pub sync_mode: SyncMode,
    pub compact_threshold_bytes: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            connection: "memory:".into(),
            name: "pointers".into(),
            sync_mode: SyncMode::default(),
            compact_threshold_bytes: DEFAULT_COMPACT_THRESHOLD,
        }
    }
}

impl QueueConfig {
    /// Open the configured queue.
    pub fn open(&self) -> QueueResult<Arc<dyn QueueTransport>> {
        if self.name.trim().is_empty() {
            return Err(QueueError::InvalidConnection(format!(
                "{}: queue name must not be empty",
                self.connection
            )));
        }
        match self.dir()? {
            None => {
                info!(queue = %self.name, "using in-memory queue");
                Ok(Arc::new(InMemoryQueue::new(&self.name)))
            }
            Some(dir) => {
                let queue = FileQueue::open(
                    dir,
                    &self.name,
                    JournalConfig {
                        sync_mode: self.sync_mode.clone(),
                    },
                    self.compact_threshold_bytes,
                )?;
                Ok(Arc::new(queue))
            }
        }
    }

    /// `true` when the connection selects the process-local backend.
    pub fn is_in_memory(&self) -> bool {
        matches!(self.dir(), Ok(None))
    }

    /// Journal directory, or `None` for the in-memory backend.
    fn dir(&self) -> QueueResult<Option<PathBuf>> {
        let conn = self.connection.trim();
        if conn == "memory:" || conn == "memory://" {
            return Ok(None);
        }
        if let Some(path) = conn.strip_prefix("file://") {
            if path.is_empty() {
                return Err(QueueError::InvalidConnection(conn.to_string()));
            }
            return Ok(Some(PathBuf::from(path)));
        }
        if conn.is_empty() || conn.contains("://") || conn.ends_with(':') {
            return Err(QueueError::InvalidConnection(conn.to_string()));
        }
        Ok(Some(PathBuf::from(conn)))
    }
}
