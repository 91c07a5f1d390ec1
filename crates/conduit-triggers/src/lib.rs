//! Trigger host for Conduit.
//!
//! Two independent subscriptions drive downstream work:
//!
//! - [`QueueTrigger`] pulls deliveries from a [`QueueTransport`] with a pool
//!   of workers and hands each to a [`MessageHandler`]. Success completes the
//!   delivery, failure abandons it for redelivery, and a delivery past the
//!   configured maximum is dead-lettered.
//! - [`BlobTrigger`] follows an object store's write events for one container
//!   and hands each to a [`BlobHandler`].
//!
//! [`QueueReactor`] and [`StorageReactor`] are the handlers wired by the
//! `conduit` binary. Neither trigger waits on or informs the other.
//!
//! [`QueueTransport`]: conduit_queue::QueueTransport

pub mod error;
pub mod reactors;
pub mod runtime;
pub mod traits;

pub use error::{TriggerError, TriggerResult};
pub use reactors::{BlobReport, MessageReport, QueueReactor, StorageReactor};
pub use runtime::{BlobTrigger, QueueTrigger, TriggerConfig, TriggerHandle};
pub use traits::{BlobHandler, MessageHandler};
