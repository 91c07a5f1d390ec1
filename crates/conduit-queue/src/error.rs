use std::io;
use std::path::PathBuf;

use uuid::Uuid;

/// Errors produced by queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The message to publish serialized to nothing (`null`).
    #[error("message must not be empty")]
    EmptyMessage,

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The queue has been closed and holds no more messages.
    #[error("queue is closed")]
    Closed,

    /// The delivery's lock is unknown: already completed or abandoned.
    #[error("unknown delivery lock {0}")]
    UnknownDelivery(Uuid),

    /// The connection string names no known backend.
    #[error("invalid queue connection '{0}'")]
    InvalidConnection(String),

    /// Another process (or another queue in this one) holds the journal.
    #[error("queue journal {} is locked by another process", .0.display())]
    Locked(PathBuf),

    /// I/O error during journal operations.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A blocking journal task panicked or was cancelled.
    #[error("queue task failed: {0}")]
    Task(String),
}

/// Convenience alias used throughout the queue crate.
pub type QueueResult<T> = std::result::Result<T, QueueError>;
