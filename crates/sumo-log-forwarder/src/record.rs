// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log records as they travel through the pipeline, and the wire message they
//! are decoded from.

use bytes::Bytes;

/// Log entry message written by the container runtime, one per frame.
#[derive(Clone, PartialEq, prost::Message)]
pub struct LogEntry {
    #[prost(string, tag = "1")]
    pub source: String,
    #[prost(int64, tag = "2")]
    pub time_nano: i64,
    #[prost(bytes = "bytes", tag = "3")]
    pub line: Bytes,
    #[prost(bool, tag = "4")]
    pub partial: bool,
    #[prost(message, optional, tag = "5")]
    pub partial_log_metadata: Option<PartialLogEntryMetadata>,
}

/// Describes where a partial line sits in the full message it belongs to.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PartialLogEntryMetadata {
    #[prost(bool, tag = "1")]
    pub last: bool,
    #[prost(string, tag = "2")]
    pub id: String,
    #[prost(int32, tag = "3")]
    pub ordinal: i32,
}

/// A decoded log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    line: Bytes,
    source: String,
    time_nano: i64,
    partial: bool,
}

impl Record {
    #[must_use]
    pub fn new(line: impl Into<Bytes>, source: impl Into<String>, time_nano: i64) -> Self {
        Record {
            line: line.into(),
            source: source.into(),
            time_nano,
            partial: false,
        }
    }

    #[must_use]
    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = partial;
        self
    }

    #[must_use]
    pub fn line(&self) -> &Bytes {
        &self.line
    }

    /// Stream the line was written to, e.g. `stdout` or `stderr`.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn time_nano(&self) -> i64 {
        self.time_nano
    }

    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// Size counted against the batch threshold.
    #[must_use]
    pub fn size(&self) -> usize {
        self.line.len()
    }
}

impl From<LogEntry> for Record {
    fn from(entry: LogEntry) -> Self {
        Record {
            line: entry.line,
            source: entry.source,
            time_nano: entry.time_nano,
            partial: entry.partial,
        }
    }
}
