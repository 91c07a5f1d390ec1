//! Object storage for Conduit.
//!
//! Every accepted payload is written once as an immutable object inside a
//! pre-existing container and is addressed afterwards by its [`Locator`].
//! Backends broadcast a [`BlobWritten`] event after each successful write so
//! storage-triggered consumers can react independently of the queue.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsObjectStore`] -- one directory per container, atomic renames
//!
//! # Design Rules
//!
//! 1. Objects are never updated or deleted by Conduit. A second write under
//!    the same name follows backend semantics; both backends overwrite.
//! 2. Write events are only broadcast after the write is durable.
//! 3. Containers are provisioned ahead of time; writing into a missing
//!    container is an error.
//! 4. No retries. Errors propagate to the caller.
//!
//! [`Locator`]: conduit_types::Locator

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod fs;
pub mod memory;
pub mod object;
pub mod traits;

pub use client::ObjectStoreClient;
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use events::{BlobWritten, WriteEvents, WriteNotifier};
pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::{ObjectContent, ObjectProperties, StoredObject};
pub use traits::ObjectStore;
