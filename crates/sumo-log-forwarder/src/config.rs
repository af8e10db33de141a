// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-pipeline configuration.
//!
//! A [`Config`] is built once when a pipeline starts and never changes after.
//! [`Config::from_log_opts`] reads the `sumo-*` options passed by the container
//! runtime. Apart from the endpoint url and the root CA file, an invalid option
//! never fails the start: it is reported and replaced by its default.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Url;
use tracing::warn;

use crate::constants::{
    BEST_COMPRESSION_LEVEL, DEFAULT_BATCH_SIZE_BYTES, DEFAULT_COMPRESSION_LEVEL,
    DEFAULT_QUEUE_SIZE, DEFAULT_SENDING_INTERVAL, RETRY_INTERVAL,
};
use crate::errors::ConfigError;

pub const OPT_URL: &str = "sumo-url";
pub const OPT_COMPRESS: &str = "sumo-compress";
pub const OPT_COMPRESS_LEVEL: &str = "sumo-compress-level";
pub const OPT_PROXY_URL: &str = "sumo-proxy-url";
pub const OPT_INSECURE_SKIP_VERIFY: &str = "sumo-insecure-skip-verify";
pub const OPT_ROOT_CA_PATH: &str = "sumo-root-ca-path";
pub const OPT_SERVER_NAME: &str = "sumo-server-name";
pub const OPT_SENDING_INTERVAL: &str = "sumo-sending-interval";
pub const OPT_QUEUE_SIZE: &str = "sumo-queue-size";
pub const OPT_BATCH_SIZE: &str = "sumo-batch-size";

/// Every option key understood by [`Config::from_log_opts`].
pub const LOG_OPTS: [&str; 10] = [
    OPT_URL,
    OPT_COMPRESS,
    OPT_COMPRESS_LEVEL,
    OPT_PROXY_URL,
    OPT_INSECURE_SKIP_VERIFY,
    OPT_ROOT_CA_PATH,
    OPT_SERVER_NAME,
    OPT_SENDING_INTERVAL,
    OPT_QUEUE_SIZE,
    OPT_BATCH_SIZE,
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    /// Accept any certificate presented by the server.
    pub insecure_skip_verify: bool,
    /// PEM bundle replacing the system roots.
    pub root_ca_pem: Option<Vec<u8>>,
    /// Name the server certificate is checked against instead of the url host.
    pub server_name: Option<String>,
}

impl TlsOptions {
    /// True when nothing differs from the stock TLS client.
    #[must_use]
    pub fn is_default(&self) -> bool {
        !self.insecure_skip_verify && self.root_ca_pem.is_none() && self.server_name.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub url: Url,
    pub compress: bool,
    /// Gzip level, -1 (default) or 0 (none) to 9 (best).
    pub compress_level: i32,
    pub proxy_url: Option<Url>,
    pub tls: TlsOptions,
    /// Longest time a non-empty batch waits before it is sent.
    pub sending_interval: Duration,
    /// Capacity of both pipeline queues.
    pub queue_size: usize,
    /// Batch size threshold, in payload bytes.
    pub batch_size: usize,
    /// Delay between delivery attempts. Not exposed as an option.
    pub retry_interval: Duration,
}

impl Config {
    /// Config with every option at its default.
    pub fn new(url: &str) -> Result<Self, ConfigError> {
        Ok(Config {
            url: parse_endpoint(url)?,
            compress: false,
            compress_level: DEFAULT_COMPRESSION_LEVEL,
            proxy_url: None,
            tls: TlsOptions::default(),
            sending_interval: DEFAULT_SENDING_INTERVAL,
            queue_size: DEFAULT_QUEUE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE_BYTES,
            retry_interval: RETRY_INTERVAL,
        })
    }

    /// Builds the config from the runtime's log options.
    pub fn from_log_opts(opts: &HashMap<String, String>) -> Result<Self, ConfigError> {
        for key in opts.keys() {
            if !LOG_OPTS.contains(&key.as_str()) {
                warn!("Ignoring unknown log option {key:?}");
            }
        }

        let url = opts
            .get(OPT_URL)
            .ok_or(ConfigError::MissingOption(OPT_URL))?;
        let mut config = Config::new(url)?;

        config.compress = opt_bool(opts, OPT_COMPRESS, false);

        let level = opt_int(opts, OPT_COMPRESS_LEVEL, DEFAULT_COMPRESSION_LEVEL);
        config.compress_level = if (DEFAULT_COMPRESSION_LEVEL..=BEST_COMPRESSION_LEVEL).contains(&level) {
            level
        } else {
            warn!(
                "Not supported level '{level}' for {OPT_COMPRESS_LEVEL} (supported values between {DEFAULT_COMPRESSION_LEVEL} and {BEST_COMPRESSION_LEVEL}). Using default compression."
            );
            DEFAULT_COMPRESSION_LEVEL
        };

        config.proxy_url = opts.get(OPT_PROXY_URL).and_then(|raw| match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("Failed to parse value of {OPT_PROXY_URL} as url. Initializing without proxy. {e}");
                None
            }
        });

        config.tls.insecure_skip_verify = opt_bool(opts, OPT_INSECURE_SKIP_VERIFY, false);
        if let Some(path) = opts.get(OPT_ROOT_CA_PATH) {
            let pem = std::fs::read(path).map_err(|source| ConfigError::RootCa {
                path: path.clone(),
                source,
            })?;
            config.tls.root_ca_pem = Some(pem);
        }
        config.tls.server_name = opts.get(OPT_SERVER_NAME).cloned();

        config.sending_interval =
            match opt_duration(opts, OPT_SENDING_INTERVAL, DEFAULT_SENDING_INTERVAL) {
                interval if interval.is_zero() => {
                    warn!(
                        "{OPT_SENDING_INTERVAL} must be a positive duration. Using default {DEFAULT_SENDING_INTERVAL:?}."
                    );
                    DEFAULT_SENDING_INTERVAL
                }
                interval => interval,
            };
        config.queue_size = opt_positive(opts, OPT_QUEUE_SIZE, DEFAULT_QUEUE_SIZE);
        config.batch_size = opt_positive(opts, OPT_BATCH_SIZE, DEFAULT_BATCH_SIZE_BYTES);

        Ok(config)
    }

    #[must_use]
    pub fn with_compression(mut self, level: i32) -> Self {
        self.compress = true;
        self.compress_level = level;
        self
    }

    #[must_use]
    pub fn with_proxy_url(mut self, proxy_url: Url) -> Self {
        self.proxy_url = Some(proxy_url);
        self
    }

    #[must_use]
    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    #[must_use]
    pub fn with_sending_interval(mut self, sending_interval: Duration) -> Self {
        self.sending_interval = sending_interval;
        self
    }

    #[must_use]
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {scheme:?}"),
        }),
    }
}

fn opt_bool(opts: &HashMap<String, String>, key: &str, default: bool) -> bool {
    let Some(raw) = opts.get(key) else {
        return default;
    };
    parse_bool(raw).unwrap_or_else(|| {
        warn!("Failed to parse value of {key} as boolean. Using default {default}.");
        default
    })
}

fn opt_int(opts: &HashMap<String, String>, key: &str, default: i32) -> i32 {
    let Some(raw) = opts.get(key) else {
        return default;
    };
    raw.parse::<i32>().unwrap_or_else(|e| {
        warn!("Failed to parse value of {key} as integer. Using default {default}. {e}");
        default
    })
}

fn opt_positive(opts: &HashMap<String, String>, key: &str, default: usize) -> usize {
    let fallback = i32::try_from(default).unwrap_or(i32::MAX);
    match usize::try_from(opt_int(opts, key, fallback)) {
        Ok(value) if value > 0 => value,
        _ => {
            warn!("{key} must be a positive value. Using default {default}.");
            default
        }
    }
}

fn opt_duration(opts: &HashMap<String, String>, key: &str, default: Duration) -> Duration {
    let Some(raw) = opts.get(key) else {
        return default;
    };
    match parse_duration(raw) {
        Ok(duration) => duration,
        Err(e) => {
            warn!("Failed to parse value of {key} as duration. Using default {default:?}. {e}");
            default
        }
    }
}

/// Accepts the same spellings as Go's `strconv.ParseBool`.
#[must_use]
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Parses durations such as `300ms`, `1.5s` or `1m30s`.
///
/// Units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. A bare `0` is
/// accepted. Negative durations are rejected.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let trimmed = raw.trim();
    let (negative, mut rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(format!("invalid duration {raw:?}"));
    }

    let mut nanos = 0f64;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_end);
        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid duration {raw:?}"))?;

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);
        let scale = match unit {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("missing unit in duration {raw:?}")),
            other => return Err(format!("unknown unit {other:?} in duration {raw:?}")),
        };
        nanos += value * scale;
        rest = tail;
    }

    if negative && nanos > 0.0 {
        return Err(format!("negative duration {raw:?}"));
    }
    if !nanos.is_finite() || nanos > u64::MAX as f64 {
        return Err(format!("duration {raw:?} out of range"));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let nanos = nanos.round() as u64;
    Ok(Duration::from_nanos(nanos))
}
