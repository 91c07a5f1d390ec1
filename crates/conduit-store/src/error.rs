use conduit_types::{Locator, LocatorScheme, TypeError};

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The locator does not resolve to an object.
    #[error("object not found: {0}")]
    NotFound(Locator),

    /// The target container has not been provisioned.
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// The locator belongs to a different backend or storage root.
    #[error("locator {locator} is not served by this {backend} store")]
    ForeignLocator {
        locator: Locator,
        backend: LocatorScheme,
    },

    /// Malformed locator, container or object name.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// The connection string names no known backend.
    #[error("invalid storage connection '{0}'")]
    InvalidConnection(String),

    /// Serialization or deserialization failure (object sidecars).
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
