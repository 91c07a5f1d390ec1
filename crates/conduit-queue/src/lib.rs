//! Message queue for Conduit.
//!
//! The ingestion path pushes one small JSON pointer per stored object; the
//! queue trigger consumes them with at-least-once semantics. A delivery that
//! is neither completed nor abandoned stays locked; abandoning it makes the
//! message available again with an incremented delivery count.
//!
//! Backends implement [`QueueTransport`]:
//!
//! - [`InMemoryQueue`] -- process-local, lost on exit
//! - [`FileQueue`] -- the same semantics journaled to disk; pending and
//!   in-flight messages are redelivered after a restart

pub mod config;
pub mod error;
pub mod file;
pub mod journal;
pub mod memory;
pub mod message;
pub mod publisher;
mod state;
pub mod traits;

pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use file::FileQueue;
pub use journal::{Journal, JournalConfig, JournalRecord, SyncMode};
pub use memory::InMemoryQueue;
pub use message::{Delivery, QueueMessage};
pub use publisher::QueuePublisher;
pub use traits::QueueTransport;
