// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Errors raised while reading frames from the input stream.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame of {len} bytes exceeds the maximum frame size of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    #[error("malformed log entry: {0}")]
    Malformed(#[from] prost::DecodeError),

    #[error("failed to read from input: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    /// Whether the decoder can be reset on the same stream and keep going.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DecodeError::Io(_))
    }
}

/// Errors raised while shipping a batch to the intake endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ShippingError {
    #[error("failed to build payload: {0}")]
    Payload(String),

    #[error("failed to send batch: {1}")]
    Destination(Option<StatusCode>, String),
}

/// Errors raised while validating pipeline options.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required option: {0}")]
    MissingOption(&'static str),

    #[error("invalid endpoint url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to read root CA from {path}: {source}")]
    RootCa {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TLS configuration: {0}")]
    Tls(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Errors returned to the host by the pipeline manager.
#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    #[error("a pipeline for {0:?} already exists")]
    AlreadyRunning(String),

    #[error("no pipeline is running for {0:?}")]
    NotRunning(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
