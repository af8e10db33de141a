// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Registry of running pipelines, keyed by source identity.
//!
//! The registry lock is only taken to insert or remove an entry. A pipeline
//! that reaches the end of its stream removes its own entry; the generation
//! number makes sure it never removes a newer pipeline started under the same
//! identity after a `stop`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::config::Config;
use crate::errors::ForwarderError;
use crate::http::build_client;
use crate::pipeline;

#[derive(Debug)]
struct Entry {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct Registry {
    pipelines: HashMap<String, Entry>,
    next_generation: u64,
}

#[derive(Debug, Clone)]
pub struct PipelineManager {
    registry: Arc<Mutex<Registry>>,
    tasks: TaskTracker,
}

impl Default for PipelineManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineManager {
    #[must_use]
    pub fn new() -> Self {
        // Kept closed: spawning still works, and `wait` returns whenever no
        // pipeline task is left.
        let tasks = TaskTracker::new();
        tasks.close();
        PipelineManager {
            registry: Arc::default(),
            tasks,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        lock(&self.registry)
    }

    /// Starts a pipeline reading from `source`.
    ///
    /// Must be called from within a tokio runtime. Fails without side effects
    /// when a pipeline is already registered for `source_id` or when the HTTP
    /// client can't be built from `config`.
    pub fn start<R>(
        &self,
        source_id: impl Into<String>,
        config: Config,
        source: R,
    ) -> Result<(), ForwarderError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let source_id = source_id.into();
        let client = build_client(&config)?;
        let cancel = CancellationToken::new();

        let generation = {
            let mut registry = self.lock();
            if registry.pipelines.contains_key(&source_id) {
                return Err(ForwarderError::AlreadyRunning(source_id));
            }
            let generation = registry.next_generation;
            registry.next_generation += 1;
            registry.pipelines.insert(
                source_id.clone(),
                Entry {
                    generation,
                    cancel: cancel.clone(),
                },
            );
            generation
        };

        info!("Starting pipeline for {source_id} to {}", config.url);
        let registry = Arc::clone(&self.registry);
        self.tasks.spawn(async move {
            pipeline::run(source_id.clone(), &config, client, source, cancel).await;

            let mut registry = lock(&registry);
            if registry
                .pipelines
                .get(&source_id)
                .is_some_and(|entry| entry.generation == generation)
            {
                registry.pipelines.remove(&source_id);
                debug!("Pipeline for {source_id} finished, removed from registry");
            }
        });
        Ok(())
    }

    /// Stops the pipeline for `source_id`.
    ///
    /// Returns once the input is closed; batches already queued are still
    /// delivered in the background.
    pub fn stop(&self, source_id: &str) -> Result<(), ForwarderError> {
        let entry = self
            .lock()
            .pipelines
            .remove(source_id)
            .ok_or_else(|| ForwarderError::NotRunning(source_id.to_string()))?;
        info!("Stopping pipeline for {source_id}");
        entry.cancel.cancel();
        Ok(())
    }

    #[must_use]
    pub fn is_running(&self, source_id: &str) -> bool {
        self.lock().pipelines.contains_key(source_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().pipelines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits until every pipeline has finished on its own.
    ///
    /// Several callers may wait at the same time.
    pub async fn wait(&self) {
        self.tasks.wait().await;
    }

    /// Stops every pipeline and waits for all of them to drain.
    pub async fn shutdown(&self) {
        let entries: Vec<(String, Entry)> = self.lock().pipelines.drain().collect();
        for (source_id, entry) in entries {
            debug!("Stopping pipeline for {source_id}");
            entry.cancel.cancel();
        }
        self.wait().await;
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // Entries are inserted and removed whole, so a poisoned lock is still usable.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}
