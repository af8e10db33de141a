// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reader for the length-delimited log stream written by the container runtime.
//!
//! Each frame is a 4-byte big-endian length followed by a protobuf `LogEntry`.
//! On a bad frame the decoder returns a recoverable error; the caller is expected
//! to rebuild the decoder on the same reader and carry on from the current byte
//! position. The resync is approximate: if the stream is misaligned, the next
//! few frames may be lost as well.

use std::io::ErrorKind;

use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

use crate::errors::DecodeError;
use crate::record::{LogEntry, Record};

pub struct RecordDecoder<R> {
    reader: R,
    max_frame_size: usize,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> RecordDecoder<R> {
    pub fn new(reader: R, max_frame_size: usize) -> Self {
        RecordDecoder {
            reader,
            max_frame_size,
            buf: Vec::new(),
        }
    }

    /// Reads the next frame.
    ///
    /// Returns `Ok(None)` once the stream has ended. A stream ending in the
    /// middle of a frame also ends the sequence; the partial frame is discarded.
    pub async fn next_record(&mut self) -> Result<Option<Record>, DecodeError> {
        let len = match self.reader.read_u32().await {
            Ok(len) => len as usize,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // The body is left on the stream, as the length can't be trusted.
        if len > self.max_frame_size {
            return Err(DecodeError::FrameTooLarge {
                len,
                max: self.max_frame_size,
            });
        }

        self.buf.clear();
        self.buf.resize(len, 0);
        match self.reader.read_exact(&mut self.buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                warn!("Input ended inside a frame of {len} bytes, discarding it");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let entry = LogEntry::decode(self.buf.as_slice())?;
        Ok(Some(Record::from(entry)))
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Encodes `entry` as one frame. Used by producers and tests.
#[must_use]
pub fn encode_frame(entry: &LogEntry) -> Vec<u8> {
    let body = entry.encode_to_vec();
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    frame
}
