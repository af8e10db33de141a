// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One source's decode, batch and deliver stages.
//!
//! ```text
//!   source ─► decode ─► record queue ─► batch ─► delivery queue ─► deliver ─► endpoint
//!            (blocks when full)              (drops oldest when full)
//! ```
//!
//! The stages run as separate tasks and only share the two queues. Shutdown
//! starts at the source: cancelling the token (or reaching the end of the
//! stream) stops the decoder, which closes the record queue, and every later
//! stage finishes its remaining work before exiting.

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::batcher::Batcher;
use crate::config::Config;
use crate::constants::MAX_FRAME_SIZE_BYTES;
use crate::decoder::RecordDecoder;
use crate::delivery_queue::delivery_queue;
use crate::record_queue::{record_queue, RecordSender};
use crate::sender::Sender;

/// Runs the pipeline for `source` until every stage has stopped.
pub async fn run<R>(
    source_id: String,
    config: &Config,
    client: reqwest::Client,
    source: R,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (record_tx, record_rx) = record_queue(config.queue_size);
    let (batch_tx, batch_rx) = delivery_queue(config.queue_size);
    let batcher = Batcher::new(
        record_rx,
        batch_tx,
        config.batch_size,
        config.sending_interval,
    );
    let sender = Sender::new(client, config);

    let stages = [
        ("decode", tokio::spawn(decode(source_id.clone(), source, record_tx, cancel))),
        ("batch", tokio::spawn(batcher.run())),
        ("deliver", tokio::spawn(sender.run(batch_rx))),
    ];
    for (stage, handle) in stages {
        if let Err(e) = handle.await {
            error!("Pipeline for {source_id}: {stage} stage failed: {e}");
        }
    }
    debug!("Pipeline for {source_id} stopped");
}

/// Feeds decoded records into the record queue.
///
/// The source is dropped, and the queue closed, when the stream ends, on a
/// read error, or when `cancel` fires.
async fn decode<R>(
    source_id: String,
    source: R,
    records: RecordSender,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut decoder = RecordDecoder::new(source, MAX_FRAME_SIZE_BYTES);
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => {
                debug!("Pipeline for {source_id}: input closed");
                break;
            }
            next = decoder.next_record() => next,
        };

        match next {
            Ok(Some(record)) => {
                if records.send(record).await.is_err() {
                    error!("Pipeline for {source_id}: batcher is gone, stopping decoder");
                    break;
                }
            }
            Ok(None) => {
                debug!("Pipeline for {source_id}: end of stream");
                break;
            }
            Err(e) if e.is_recoverable() => {
                warn!("Pipeline for {source_id}: error decoding log, resetting decoder: {e}");
                decoder = RecordDecoder::new(decoder.into_inner(), MAX_FRAME_SIZE_BYTES);
            }
            Err(e) => {
                error!("Pipeline for {source_id}: {e}");
                break;
            }
        }
    }
}
