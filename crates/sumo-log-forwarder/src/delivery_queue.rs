// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded queue of finished batches between the batcher and the sender.
//!
//! Unlike the record queue, pushing never waits: when the queue is full the
//! oldest batch is evicted to make room. This keeps memory bounded while the
//! endpoint is unavailable, at the cost of losing whole batches.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::error;

use crate::batcher::Batch;

#[derive(Debug)]
struct State {
    batches: VecDeque<Batch>,
    closed: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
    capacity: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // State is never left half-updated, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Creates a queue holding at most `capacity` batches.
#[must_use]
pub fn delivery_queue(capacity: usize) -> (BatchSender, BatchReceiver) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            batches: VecDeque::new(),
            closed: false,
        }),
        notify: Notify::new(),
        capacity,
    });
    (
        BatchSender {
            shared: Arc::clone(&shared),
        },
        BatchReceiver { shared },
    )
}

/// Producer half. Dropping it closes the queue.
#[derive(Debug)]
pub struct BatchSender {
    shared: Arc<Shared>,
}

impl BatchSender {
    /// Enqueues `batch` without waiting.
    ///
    /// Returns the evicted batch when the queue was full.
    pub fn push(&self, batch: Batch) -> Option<Batch> {
        let evicted = {
            let mut state = self.shared.lock();
            let evicted = if state.batches.len() >= self.shared.capacity {
                state.batches.pop_front()
            } else {
                None
            };
            state.batches.push_back(batch);
            evicted
        };
        if let Some(dropped) = &evicted {
            error!(
                "LOGS | Delivery queue full ({} batches), dropping oldest batch of {} logs",
                self.shared.capacity,
                dropped.len()
            );
        }
        self.shared.notify.notify_one();
        evicted
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.lock().batches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

impl Drop for BatchSender {
    fn drop(&mut self) {
        self.shared.lock().closed = true;
        self.shared.notify.notify_one();
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct BatchReceiver {
    shared: Arc<Shared>,
}

impl BatchReceiver {
    /// Waits for the oldest queued batch.
    ///
    /// Returns `None` only once the sender is gone and every queued batch has
    /// been handed out.
    pub async fn recv(&mut self) -> Option<Batch> {
        loop {
            {
                let mut state = self.shared.lock();
                if let Some(batch) = state.batches.pop_front() {
                    return Some(batch);
                }
                if state.closed {
                    return None;
                }
            }
            // notify_one stores a permit, so a push between the check and
            // this await is not missed.
            self.shared.notify.notified().await;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.lock().batches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
