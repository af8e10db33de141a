// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log forwarder for Sumo Logic HTTP sources.
//!
//! Reads length-prefixed log entries from a byte stream, groups them into
//! size-bounded batches and POSTs each batch to an HTTP endpoint, retrying
//! until it is accepted. [`PipelineManager`] runs one such pipeline per input
//! source.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batcher;
pub mod config;
pub mod constants;
pub mod decoder;
pub mod delivery_queue;
pub mod errors;
pub mod http;
pub mod manager;
pub mod pipeline;
pub mod record;
pub mod record_queue;
pub mod sender;

pub use config::{Config, TlsOptions};
pub use errors::{ConfigError, ForwarderError};
pub use manager::PipelineManager;
pub use record::{LogEntry, Record};
