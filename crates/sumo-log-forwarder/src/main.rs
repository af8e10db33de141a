// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::collections::HashMap;
use std::env;

use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use sumo_log_forwarder::config::LOG_OPTS;
use sumo_log_forwarder::{Config, PipelineManager};

const STDIN_SOURCE_ID: &str = "stdin";

#[tokio::main]
pub async fn main() {
    let log_level = env::var("SUMO_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");

    let filter = EnvFilter::try_new(&env_filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install log subscriber: {e}");
    }
    debug!("Logging subsystem enabled");

    let config = match Config::from_log_opts(&log_opts_from_env()) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let manager = PipelineManager::new();
    if let Err(e) = manager.start(STDIN_SOURCE_ID, config, tokio::io::stdin()) {
        error!("Failed to start forwarding: {e}");
        std::process::exit(1);
    }

    tokio::select! {
        () = manager.wait() => info!("Input closed and all logs delivered, exiting"),
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {e}");
            }
            warn!("Interrupted, exiting without delivering queued logs");
        }
    }
}

/// Reads each log option from the environment, e.g. `sumo-url` from `SUMO_URL`.
fn log_opts_from_env() -> HashMap<String, String> {
    LOG_OPTS
        .iter()
        .filter_map(|key| {
            let var = key.to_uppercase().replace('-', "_");
            env::var(var).ok().map(|value| ((*key).to_string(), value))
        })
        .collect()
}
