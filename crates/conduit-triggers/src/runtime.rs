use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use conduit_queue::{Delivery, QueueError, QueueTransport};
use conduit_store::{ObjectStore, WriteEvents};

use crate::traits::{BlobHandler, MessageHandler};

/// Pause after a transport error before polling again.
const RECEIVE_BACKOFF: Duration = Duration::from_millis(500);

/// Settings for the queue trigger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Number of queue workers.
    pub concurrency: usize,
    /// Deliveries beyond this count are dead-lettered instead of handled.
    pub max_delivery_count: u32,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_delivery_count: 10,
        }
    }
}

/// Running trigger. Dropping the handle leaves the loops running.
pub struct TriggerHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl TriggerHandle {
    fn new(name: &'static str, shutdown: watch::Sender<bool>, tasks: Vec<JoinHandle<()>>) -> Self {
        Self {
            name,
            shutdown,
            tasks,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal every loop to stop and wait for them to exit.
    ///
    /// A handler already running is allowed to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(trigger = self.name, error = %e, "trigger task failed");
            }
        }
        info!(trigger = self.name, "trigger stopped");
    }

    /// `true` once every loop has exited on its own.
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }
}

impl std::fmt::Debug for TriggerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerHandle")
            .field("name", &self.name)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

/// Resolves once shutdown is signalled or the handle is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stop = *shutdown.borrow_and_update();
        if stop {
            return;
        }
        if shutdown.changed().await.is_err() {
            // The handle was dropped without a shutdown; keep running.
            std::future::pending::<()>().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Queue trigger
// ---------------------------------------------------------------------------

/// Worker pool invoking a [`MessageHandler`] for every queue delivery.
pub struct QueueTrigger {
    transport: Arc<dyn QueueTransport>,
    handler: Arc<dyn MessageHandler>,
    config: TriggerConfig,
}

impl QueueTrigger {
    /// Start `config.concurrency` workers (at least one) and return at once.
    pub fn spawn(
        transport: Arc<dyn QueueTransport>,
        handler: Arc<dyn MessageHandler>,
        config: TriggerConfig,
    ) -> TriggerHandle {
        let workers = config.concurrency.max(1);
        let trigger = Arc::new(Self {
            transport,
            handler,
            config,
        });
        let (tx, rx) = watch::channel(false);

        let tasks = (0..workers)
            .map(|worker| {
                let trigger = Arc::clone(&trigger);
                let rx = rx.clone();
                tokio::spawn(async move { trigger.worker_loop(worker, rx).await })
            })
            .collect();

        info!(
            queue = %trigger.transport.name(),
            workers,
            max_delivery_count = trigger.config.max_delivery_count,
            "queue trigger started"
        );
        TriggerHandle::new("queue", tx, tasks)
    }

    async fn worker_loop(&self, worker: usize, mut shutdown: watch::Receiver<bool>) {
        debug!(worker, "queue worker started");
        loop {
            let received = tokio::select! {
                _ = stopped(&mut shutdown) => break,
                received = self.transport.receive() => received,
            };
            match received {
                Ok(delivery) => self.dispatch(worker, delivery).await,
                Err(QueueError::Closed) => {
                    info!(worker, "queue closed; worker exiting");
                    break;
                }
                Err(e) => {
                    warn!(worker, error = %e, "queue receive failed");
                    tokio::select! {
                        _ = stopped(&mut shutdown) => break,
                        _ = tokio::time::sleep(RECEIVE_BACKOFF) => {}
                    }
                }
            }
        }
        debug!(worker, "queue worker stopped");
    }

    async fn dispatch(&self, worker: usize, delivery: Delivery) {
        let id = delivery.message.id;
        if delivery.delivery_count > self.config.max_delivery_count {
            error!(
                worker,
                %id,
                delivery_count = delivery.delivery_count,
                content = %delivery.message.body_as_text(),
                "max delivery count exceeded; dead-lettering message"
            );
            self.settle(&delivery, true).await;
            return;
        }

        // A panicking handler surfaces as a JoinError instead of killing the
        // worker with the delivery still locked.
        let handler = Arc::clone(&self.handler);
        let owned = delivery.clone();
        let outcome = tokio::spawn(async move { handler.handle(&owned).await }).await;

        match outcome {
            Ok(Ok(())) => self.settle(&delivery, true).await,
            Err(e) => {
                error!(
                    worker,
                    %id,
                    delivery_count = delivery.delivery_count,
                    error = %e,
                    "message handler panicked; abandoning for redelivery"
                );
                self.settle(&delivery, false).await;
            }
            Ok(Err(e)) => {
                warn!(
                    worker,
                    %id,
                    delivery_count = delivery.delivery_count,
                    error = %e,
                    "message handler failed; abandoning for redelivery"
                );
                self.settle(&delivery, false).await;
            }
        }
    }

    async fn settle(&self, delivery: &Delivery, completed: bool) {
        let result = if completed {
            self.transport.complete(delivery).await
        } else {
            self.transport.abandon(delivery).await
        };
        if let Err(e) = result {
            error!(id = %delivery.message.id, completed, error = %e, "failed to settle delivery");
        }
    }
}

// ---------------------------------------------------------------------------
// Blob trigger
// ---------------------------------------------------------------------------

/// Subscription invoking a [`BlobHandler`] for writes into one container.
pub struct BlobTrigger;

impl BlobTrigger {
    /// Subscribe to `store` and start the event loop.
    ///
    /// The subscription is taken before returning, so every write completed
    /// after this call is observed.
    pub fn spawn(
        store: &dyn ObjectStore,
        container: &str,
        handler: Arc<dyn BlobHandler>,
    ) -> TriggerHandle {
        let events = store.subscribe();
        let container = container.to_lowercase();
        let (tx, rx) = watch::channel(false);

        info!(container = %container, "blob trigger started");
        let task = tokio::spawn(Self::event_loop(events, container, handler, rx));
        TriggerHandle::new("blob", tx, vec![task])
    }

    async fn event_loop(
        mut events: WriteEvents,
        container: String,
        handler: Arc<dyn BlobHandler>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let event = tokio::select! {
                _ = stopped(&mut shutdown) => break,
                event = events.recv() => event,
            };
            match event {
                Ok(event) if event.container == container => {
                    if let Err(e) = handler.handle(&event).await {
                        error!(locator = %event.locator, error = %e, "blob handler failed");
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(container = %container, missed, "blob trigger lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!(container = %container, "write events closed; blob trigger exiting");
                    break;
                }
            }
        }
    }
}
