use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{QueueError, QueueResult};
use crate::journal::{Journal, JournalConfig, JournalRecord};
use crate::memory::wait_for_delivery;
use crate::message::{Delivery, QueueMessage};
use crate::state::{Pending, QueueState};
use crate::traits::QueueTransport;

/// Journal size above which a settle triggers compaction.
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 16 * 1024 * 1024;

/// Journal-backed queue.
///
/// Every transition is appended to `{dir}/{name}.journal` before it becomes
/// visible. Reopening replays the journal: messages that were ready or in
/// flight are ready again, and each journaled abandon counts as a previous
/// delivery. A delivery interrupted by a crash is not counted.
///
/// Only one `FileQueue` may have a journal open at a time; a second open
/// fails with [`QueueError::Locked`]. A transition runs to completion on the
/// blocking pool once started, so dropping the calling future never leaves
/// the journal and the in-memory state disagreeing.
pub struct FileQueue {
    name: String,
    journal: Arc<Journal>,
    state: Arc<Mutex<QueueState>>,
    notify: Arc<Notify>,
    /// Serializes journal writes with their state transitions.
    io: Arc<tokio::sync::Mutex<()>>,
    compact_threshold: u64,
}

impl FileQueue {
    /// Open (or create) the queue `name` under `dir` and recover its contents.
    pub fn open(
        dir: impl AsRef<Path>,
        name: &str,
        config: JournalConfig,
        compact_threshold: u64,
    ) -> QueueResult<Self> {
        let path = journal_path(dir.as_ref(), name);
        let journal = Journal::open(&path, config)?;
        let recovered = recover(journal.replay()?);

        let mut state = QueueState::default();
        for pending in recovered {
            state.enqueue(pending);
        }
        journal.rewrite(&snapshot(&state))?;

        let queue = Self {
            name: name.to_string(),
            journal: Arc::new(journal),
            state: Arc::new(Mutex::new(state)),
            notify: Arc::new(Notify::new()),
            io: Arc::new(tokio::sync::Mutex::new(())),
            compact_threshold,
        };
        info!(
            queue = %queue.name,
            path = %path.display(),
            recovered = queue.len(),
            "file queue opened"
        );
        Ok(queue)
    }

    pub fn journal_path(&self) -> &Path {
        self.journal.path()
    }

    /// Rewrite the journal so it holds only unsettled messages.
    pub async fn compact(&self) -> QueueResult<()> {
        let io = Arc::clone(&self.io).lock_owned().await;
        let before = self.journal.offset();
        let journal = Arc::clone(&self.journal);
        let state = Arc::clone(&self.state);
        blocking(move || {
            let _io = io;
            let records = snapshot(&*state.lock().expect("queue mutex poisoned"));
            journal.rewrite(&records)
        })
        .await?;
        debug!(
            queue = %self.name,
            before,
            after = self.journal.offset(),
            "journal compacted"
        );
        Ok(())
    }

    async fn maybe_compact(&self) {
        if self.journal.offset() <= self.compact_threshold {
            return;
        }
        if let Err(e) = self.compact().await {
            warn!(queue = %self.name, error = %e, "journal compaction failed");
        }
    }

    /// Journal `record`, then apply `apply` to the state under the same I/O
    /// guard. `apply` returns whether a message became ready.
    async fn transition<F>(&self, record: JournalRecord, apply: F) -> QueueResult<()>
    where
        F: FnOnce(&mut QueueState) -> QueueResult<bool> + Send + 'static,
    {
        let io = Arc::clone(&self.io).lock_owned().await;
        let journal = Arc::clone(&self.journal);
        let state = Arc::clone(&self.state);
        let notify = Arc::clone(&self.notify);
        blocking(move || {
            let _io = io;
            journal.append(&record)?;
            let mut state = state.lock().expect("queue mutex poisoned");
            let ready = apply(&mut *state)?;
            if ready {
                notify.notify_one();
            }
            Ok(())
        })
        .await
    }

    fn locked_id(&self, delivery: &Delivery) -> QueueResult<Uuid> {
        let state = self.state.lock().expect("queue mutex poisoned");
        Ok(state.locked(delivery.lock_token)?.message.id)
    }

    fn poll(&self) -> QueueResult<Option<Delivery>> {
        self.state.lock().expect("queue mutex poisoned").next_delivery()
    }
}

fn journal_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.journal"))
}

/// Records reproducing `state`: each message followed by one abandon per
/// completed earlier delivery.
fn snapshot(state: &QueueState) -> Vec<JournalRecord> {
    let mut records = Vec::new();
    let mut push = |pending: &Pending, previous: u32| {
        records.push(JournalRecord::Enqueued(pending.message.clone()));
        for _ in 0..previous {
            records.push(JournalRecord::Abandoned(pending.message.id));
        }
    };
    for pending in state.ready() {
        push(pending, pending.delivery_count);
    }
    for pending in state.in_flight() {
        push(pending, pending.delivery_count.saturating_sub(1));
    }
    records
}

/// Fold journal records into the unsettled messages, in enqueue order.
fn recover(records: Vec<JournalRecord>) -> Vec<Pending> {
    let mut order = Vec::new();
    let mut pending: HashMap<Uuid, Pending> = HashMap::new();
    for record in records {
        match record {
            JournalRecord::Enqueued(message) => {
                order.push(message.id);
                pending.insert(
                    message.id,
                    Pending {
                        message,
                        delivery_count: 0,
                    },
                );
            }
            JournalRecord::Abandoned(id) => match pending.get_mut(&id) {
                Some(p) => p.delivery_count += 1,
                None => warn!(%id, "abandon for unknown message in journal"),
            },
            JournalRecord::Completed(id) => {
                pending.remove(&id);
            }
        }
    }
    order
        .into_iter()
        .filter_map(|id| pending.remove(&id))
        .collect()
}

async fn blocking<T, F>(f: F) -> QueueResult<T>
where
    F: FnOnce() -> QueueResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| QueueError::Task(e.to_string()))?
}

#[async_trait]
impl QueueTransport for FileQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: QueueMessage) -> QueueResult<()> {
        if self.state.lock().expect("queue mutex poisoned").is_closed() {
            return Err(QueueError::Closed);
        }
        let id = message.id;
        let record = JournalRecord::Enqueued(message.clone());
        self.transition(record, move |state| {
            state.enqueue(Pending {
                message,
                delivery_count: 0,
            });
            Ok(true)
        })
        .await?;
        debug!(queue = %self.name, %id, "message journaled");
        self.maybe_compact().await;
        Ok(())
    }

    async fn receive(&self) -> QueueResult<Delivery> {
        wait_for_delivery(&self.notify, || self.poll()).await
    }

    async fn try_receive(&self) -> QueueResult<Option<Delivery>> {
        self.poll()
    }

    async fn complete(&self, delivery: &Delivery) -> QueueResult<()> {
        let id = self.locked_id(delivery)?;
        let token = delivery.lock_token;
        self.transition(JournalRecord::Completed(id), move |state| {
            state.complete(token)?;
            Ok(false)
        })
        .await?;
        self.maybe_compact().await;
        Ok(())
    }

    async fn abandon(&self, delivery: &Delivery) -> QueueResult<()> {
        let id = self.locked_id(delivery)?;
        let token = delivery.lock_token;
        self.transition(JournalRecord::Abandoned(id), move |state| {
            state.abandon(token)?;
            Ok(true)
        })
        .await
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

impl std::fmt::Debug for FileQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileQueue")
            .field("name", &self.name)
            .field("journal", &self.journal.path())
            .field("len", &self.len())
            .finish()
    }
}
