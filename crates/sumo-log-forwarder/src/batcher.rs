// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Groups records into size-bounded batches.
//!
//! A batch is handed to the delivery queue when either:
//! 1. **Size**: the next record would push it over the size threshold, or
//! 2. **Time**: the flush interval elapses while it holds at least one record.
//!
//! When the record queue closes, whatever is left is flushed once and the
//! delivery queue is closed behind it.

use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::delivery_queue::BatchSender;
use crate::record::Record;
use crate::record_queue::RecordReceiver;

/// Records in arrival order and their cumulative payload size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    records: Vec<Record>,
    size_bytes: usize,
}

impl Batch {
    pub fn push(&mut self, record: Record) {
        self.size_bytes += record.size();
        self.records.push(record);
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct Batcher {
    records: RecordReceiver,
    batches: BatchSender,
    batch_size_bytes: usize,
    flush_interval: Duration,
    current: Batch,
}

impl Batcher {
    #[must_use]
    pub fn new(
        records: RecordReceiver,
        batches: BatchSender,
        batch_size_bytes: usize,
        flush_interval: Duration,
    ) -> Self {
        Batcher {
            records,
            batches,
            batch_size_bytes,
            flush_interval,
            current: Batch::default(),
        }
    }

    /// Runs until the record queue is closed and drained.
    pub async fn run(mut self) {
        let mut ticker = interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // The ticker is checked first: it is ready at most once per
                // interval, so a busy record queue can't hold back a timed flush.
                biased;
                _ = ticker.tick() => {
                    if !self.current.is_empty() {
                        debug!("LOGS | Flush interval elapsed, flushing {} logs", self.current.len());
                        self.flush();
                    }
                }
                record = self.records.recv() => match record {
                    Some(record) => self.add(record),
                    None => break,
                }
            }
        }

        if !self.current.is_empty() {
            debug!("LOGS | Input closed, flushing the last {} logs", self.current.len());
            self.flush();
        }
        debug!("LOGS | Batcher stopped");
        // Dropping `self.batches` closes the delivery queue.
    }

    fn add(&mut self, record: Record) {
        if record.size() > self.batch_size_bytes {
            warn!(
                "LOGS | Log of {} bytes is larger than the batch size of {} bytes, dropping it",
                record.size(),
                self.batch_size_bytes
            );
            return;
        }
        if self.current.size_bytes() + record.size() > self.batch_size_bytes {
            self.flush();
        }
        self.current.push(record);
    }

    fn flush(&mut self) {
        let batch = std::mem::take(&mut self.current);
        self.batches.push(batch);
    }
}
