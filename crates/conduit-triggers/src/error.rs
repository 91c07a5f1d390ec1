use conduit_queue::QueueError;
use conduit_store::StoreError;
use conduit_types::TypeError;

/// Errors raised by reactors and the trigger host.
///
/// A handler error on a queue delivery abandons it for redelivery.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Type(#[from] TypeError),

    /// A handler rejected its input.
    #[error("handler failed: {0}")]
    Handler(String),
}

pub type TriggerResult<T> = std::result::Result<T, TriggerError>;
