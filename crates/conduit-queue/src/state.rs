use std::collections::{HashMap, VecDeque};

use uuid::Uuid;

use crate::error::{QueueError, QueueResult};
use crate::message::{Delivery, QueueMessage};

/// A message waiting for delivery with the number of times it was delivered.
#[derive(Clone, Debug)]
pub(crate) struct Pending {
    pub message: QueueMessage,
    pub delivery_count: u32,
}

/// Ready queue plus locked in-flight deliveries. Shared by every backend.
#[derive(Debug, Default)]
pub(crate) struct QueueState {
    ready: VecDeque<Pending>,
    in_flight: HashMap<Uuid, Pending>,
    closed: bool,
}

impl QueueState {
    pub fn enqueue(&mut self, pending: Pending) {
        self.ready.push_back(pending);
    }

    /// Lock the next ready message. `Err(Closed)` once closed and drained.
    pub fn next_delivery(&mut self) -> QueueResult<Option<Delivery>> {
        match self.ready.pop_front() {
            Some(mut pending) => {
                pending.delivery_count += 1;
                let lock_token = Uuid::new_v4();
                let delivery = Delivery {
                    message: pending.message.clone(),
                    delivery_count: pending.delivery_count,
                    lock_token,
                };
                self.in_flight.insert(lock_token, pending);
                Ok(Some(delivery))
            }
            None if self.closed => Err(QueueError::Closed),
            None => Ok(None),
        }
    }

    pub fn locked(&self, lock_token: Uuid) -> QueueResult<&Pending> {
        self.in_flight
            .get(&lock_token)
            .ok_or(QueueError::UnknownDelivery(lock_token))
    }

    pub fn complete(&mut self, lock_token: Uuid) -> QueueResult<Pending> {
        self.in_flight
            .remove(&lock_token)
            .ok_or(QueueError::UnknownDelivery(lock_token))
    }

    pub fn abandon(&mut self, lock_token: Uuid) -> QueueResult<()> {
        let pending = self.complete(lock_token)?;
        self.ready.push_back(pending);
        Ok(())
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn ready(&self) -> impl Iterator<Item = &Pending> {
        self.ready.iter()
    }

    pub fn in_flight(&self) -> impl Iterator<Item = &Pending> {
        self.in_flight.values()
    }
}
