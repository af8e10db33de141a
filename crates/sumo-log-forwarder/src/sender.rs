// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivers batches to the intake endpoint, one at a time.
//!
//! A batch body is built once: the record lines joined with `\n`, each line
//! terminated, optionally gzipped. Delivery is retried with the same body at a
//! fixed interval until the endpoint answers `200 OK`. While a batch is being
//! retried, newer batches wait in the delivery queue, which drops its oldest
//! entries when full.

use std::io::Write;
use std::time::{Duration, Instant};

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use tracing::{debug, error, warn};

use crate::batcher::Batch;
use crate::config::Config;
use crate::delivery_queue::BatchReceiver;
use crate::errors::ShippingError;

#[derive(Debug, Clone)]
pub struct Sender {
    client: reqwest::Client,
    endpoint: Url,
    compression: Option<Compression>,
    retry_interval: Duration,
}

impl Sender {
    #[must_use]
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        // Negative levels mean the gzip default.
        let compression = config.compress.then(|| {
            u32::try_from(config.compress_level)
                .map_or_else(|_| Compression::default(), Compression::new)
        });
        Sender {
            client,
            endpoint: config.url.clone(),
            compression,
            retry_interval: config.retry_interval,
        }
    }

    /// Delivers every batch from `batches` until the queue is closed and drained.
    pub async fn run(self, mut batches: BatchReceiver) {
        while let Some(batch) = batches.recv().await {
            self.deliver(&batch).await;
        }
        debug!("LOGS | Sender stopped");
    }

    /// Sends `batch` until it is accepted.
    ///
    /// Never gives up on a batch whose body could be built.
    pub async fn deliver(&self, batch: &Batch) {
        let body = match self.serialize(batch) {
            Ok(body) => body,
            Err(e) => {
                error!("LOGS | Dropping batch of {} logs: {e}", batch.len());
                return;
            }
        };

        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            let start = Instant::now();
            match self.send(body.clone()).await {
                Ok(()) => {
                    debug!(
                        "LOGS | Sent batch of {} logs in {} ms after {attempts} attempt(s)",
                        batch.len(),
                        start.elapsed().as_millis()
                    );
                    return;
                }
                Err(e) => {
                    warn!(
                        "LOGS | Attempt {attempts} {e}. Retrying in {:?}",
                        self.retry_interval
                    );
                }
            }
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    /// Builds the request body for `batch`.
    pub fn serialize(&self, batch: &Batch) -> Result<Bytes, ShippingError> {
        let mut payload = Vec::with_capacity(batch.size_bytes() + batch.len());
        for record in batch.records() {
            payload.extend_from_slice(record.line());
            payload.push(b'\n');
        }

        let Some(level) = self.compression else {
            return Ok(Bytes::from(payload));
        };
        let mut encoder = GzEncoder::new(Vec::new(), level);
        encoder
            .write_all(&payload)
            .map_err(|e| ShippingError::Payload(format!("failed to compress batch: {e}")))?;
        let compressed = encoder
            .finish()
            .map_err(|e| ShippingError::Payload(format!("failed to compress batch: {e}")))?;
        Ok(Bytes::from(compressed))
    }

    async fn send(&self, body: Bytes) -> Result<(), ShippingError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "text/plain")
            .body(body);
        if self.compression.is_some() {
            request = request.header(CONTENT_ENCODING, "gzip");
        }

        let response = request
            .send()
            .await
            .map_err(|e| ShippingError::Destination(e.status(), format!("failed to reach endpoint: {e}")))?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(ShippingError::Destination(
            Some(status),
            format!("endpoint returned {status}: {text}"),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::Record;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn batch(lines: &[&'static str]) -> Batch {
        let mut batch = Batch::default();
        for line in lines {
            batch.push(Record::new(*line, "stdout", 0));
        }
        batch
    }

    fn sender(config: &Config) -> Sender {
        Sender::new(reqwest::Client::new(), config)
    }

    fn config() -> Config {
        Config::new("http://localhost:1/receiver").unwrap()
    }

    #[test]
    fn test_serialize_terminates_every_line() {
        let body = sender(&config()).serialize(&batch(&["a", "b", "c"])).unwrap();
        assert_eq!(body.as_ref(), b"a\nb\nc\n");
    }

    #[test]
    fn test_serialize_keeps_empty_lines() {
        let body = sender(&config()).serialize(&batch(&["", "x"])).unwrap();
        assert_eq!(body.as_ref(), b"\nx\n");
    }

    #[test]
    fn test_serialize_gzip() {
        for level in [-1, 0, 1, 9] {
            let config = config().with_compression(level);
            let body = sender(&config).serialize(&batch(&["hello", "world"])).unwrap();
            assert_eq!(&body[..2], &[0x1f, 0x8b]);

            let mut decoded = String::new();
            GzDecoder::new(body.as_ref())
                .read_to_string(&mut decoded)
                .unwrap();
            assert_eq!(decoded, "hello\nworld\n");
        }
    }

    #[test]
    fn test_compression_level_mapping() {
        assert_eq!(sender(&config()).compression, None);
        assert_eq!(
            sender(&config().with_compression(-1)).compression,
            Some(Compression::default())
        );
        assert_eq!(
            sender(&config().with_compression(9)).compression,
            Some(Compression::best())
        );
        assert_eq!(
            sender(&config().with_compression(0)).compression,
            Some(Compression::none())
        );
    }
}
