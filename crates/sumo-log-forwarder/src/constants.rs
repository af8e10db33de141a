// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Defaults and limits for the forwarding pipeline.

use std::time::Duration;

/// Largest frame the decoder accepts, in bytes.
pub const MAX_FRAME_SIZE_BYTES: usize = 1_000_000;

/// Maximum time a non-empty batch waits before it is flushed.
pub const DEFAULT_SENDING_INTERVAL: Duration = Duration::from_secs(2);

/// Capacity of the record queue and of the delivery queue.
pub const DEFAULT_QUEUE_SIZE: usize = 4000;

/// Batch size threshold, in payload bytes.
pub const DEFAULT_BATCH_SIZE_BYTES: usize = 1000;

/// Delay between two delivery attempts of the same batch.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Gzip level meaning "library default".
pub const DEFAULT_COMPRESSION_LEVEL: i32 = -1;

/// Best (slowest) gzip level.
pub const BEST_COMPRESSION_LEVEL: i32 = 9;

/// Timeout applied to every delivery request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
