use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::{QueueError, QueueResult};
use crate::message::{Delivery, QueueMessage};
use crate::state::{Pending, QueueState};
use crate::traits::QueueTransport;

/// Wait until `poll` yields a delivery, re-polling on every notification.
///
/// The notification is armed before polling so a `send` or `close` racing
/// with an empty poll is never missed.
pub(crate) async fn wait_for_delivery<F>(notify: &Notify, mut poll: F) -> QueueResult<Delivery>
where
    F: FnMut() -> QueueResult<Option<Delivery>>,
{
    loop {
        let notified = notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if let Some(delivery) = poll()? {
            return Ok(delivery);
        }
        notified.await;
    }
}

/// Process-local queue.
///
/// Messages live in memory only; a crash loses everything not yet completed.
pub struct InMemoryQueue {
    name: String,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl InMemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    /// Messages currently locked by consumers.
    pub fn in_flight(&self) -> usize {
        self.state.lock().expect("queue mutex poisoned").in_flight_len()
    }

    fn poll(&self) -> QueueResult<Option<Delivery>> {
        self.state.lock().expect("queue mutex poisoned").next_delivery()
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: QueueMessage) -> QueueResult<()> {
        {
            let mut state = self.state.lock().expect("queue mutex poisoned");
            if state.is_closed() {
                return Err(QueueError::Closed);
            }
            debug!(queue = %self.name, id = %message.id, "message enqueued");
            state.enqueue(Pending {
                message,
                delivery_count: 0,
            });
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn receive(&self) -> QueueResult<Delivery> {
        wait_for_delivery(&self.notify, || self.poll()).await
    }

    async fn try_receive(&self) -> QueueResult<Option<Delivery>> {
        self.poll()
    }

    async fn complete(&self, delivery: &Delivery) -> QueueResult<()> {
        self.state
            .lock()
            .expect("queue mutex poisoned")
            .complete(delivery.lock_token)?;
        Ok(())
    }

    async fn abandon(&self, delivery: &Delivery) -> QueueResult<()> {
        self.state
            .lock()
            .expect("queue mutex poisoned")
            .abandon(delivery.lock_token)?;
        self.notify.notify_one();
        Ok(())
    }

    fn len(&self) -> usize {
        let state = self.state.lock().expect("queue mutex poisoned");
        state.ready_len() + state.in_flight_len()
    }

    fn close(&self) {
        self.state.lock().expect("queue mutex poisoned").close();
        self.notify.notify_waiters();
    }
}

impl std::fmt::Debug for InMemoryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryQueue")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}
