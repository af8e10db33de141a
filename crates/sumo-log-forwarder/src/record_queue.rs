// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded queue between the decoder and the batcher.
//!
//! A full queue makes the decoder wait instead of dropping records, which in
//! turn stops it from reading its input. Dropping the sender closes the queue;
//! the receiver still gets every record sent before that.

use tokio::sync::mpsc;

use crate::record::Record;

#[must_use]
pub fn record_queue(capacity: usize) -> (RecordSender, RecordReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (RecordSender { tx }, RecordReceiver { rx })
}

#[derive(Debug)]
pub struct RecordSender {
    tx: mpsc::Sender<Record>,
}

impl RecordSender {
    /// Waits for a free slot, then enqueues `record`.
    ///
    /// Hands the record back if the batcher is gone.
    pub async fn send(&self, record: Record) -> Result<(), Record> {
        self.tx.send(record).await.map_err(|e| e.0)
    }
}

#[derive(Debug)]
pub struct RecordReceiver {
    rx: mpsc::Receiver<Record>,
}

impl RecordReceiver {
    /// Next record in arrival order, `None` once closed and drained.
    pub async fn recv(&mut self) -> Option<Record> {
        self.rx.recv().await
    }
}
