//! Foundation types for Conduit.
//!
//! Conduit accepts JSON payloads over HTTP, persists each one as an immutable
//! object, and publishes a small pointer message to a queue. This crate holds
//! the types every stage agrees on.
//!
//! # Key Types
//!
//! - [`Locator`]: Self-describing absolute address of a stored object
//! - [`ObjectName`]: `{timestamp}-{identifier}.json` object key
//! - [`PointerMessage`]: The only payload pushed to the queue
//! - [`Metadata`]: Key/value pairs attached to stored objects

pub mod error;
pub mod locator;
pub mod message;
pub mod metadata;
pub mod naming;

pub use error::TypeError;
pub use locator::{Locator, LocatorScheme};
pub use message::{PointerMessage, POINTER_LABEL};
pub use metadata::{Metadata, CONTENT_TYPE_JSON, REMOTE_IP_ADDRESS};
pub use naming::{
    extract_identifier, IdentifierError, ObjectName, FALLBACK_IDENTIFIER, TIMESTAMP_FORMAT,
};
