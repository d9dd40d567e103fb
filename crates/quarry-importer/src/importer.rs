//! Process-wide pipeline state and the worker pool.
//!
//! Everything the pipeline shares (the staging directory, the ingest
//! queue, the merge gate, the index engine, the backend handle) lives in
//! one [`Importer`] value constructed at startup and injected into the
//! HTTP handlers. There are no hidden globals; the filesystem is the only
//! state shared between ingestion and merging.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tracing::Instrument;

use quarry_core::ProcessRunner;
use quarry_core::observability::package_span;
use quarry_index::IndexEngine;

use crate::backend::IndexBackend;
use crate::config::Config;
use crate::error::{ImporterError, Result};
use crate::filter::FilterConfig;
use crate::indexer::index_package;
use crate::unpack::unpack;

/// Suffix of descriptor files. Their arrival completes a package upload.
pub const DESCRIPTOR_SUFFIX: &str = ".dsc";

/// Shared state of the ingest pipeline.
pub struct Importer {
    config: Config,
    filter: FilterConfig,
    /// STAGE: process-private, removed on drop.
    staging: TempDir,
    engine: Arc<dyn IndexEngine>,
    runner: Arc<dyn ProcessRunner>,
    backend: Arc<dyn IndexBackend>,
    queue_tx: mpsc::UnboundedSender<String>,
    queue_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    merge_gate: Arc<Semaphore>,
}

impl std::fmt::Debug for Importer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Importer")
            .field("config", &self.config)
            .field("staging", &self.staging.path())
            .finish_non_exhaustive()
    }
}

impl Importer {
    /// Creates the pipeline state: the store directory and the staging
    /// area, the ingest queue, and the merge gate.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration or if either directory cannot be
    /// set up.
    pub fn new(
        config: Config,
        engine: Arc<dyn IndexEngine>,
        runner: Arc<dyn ProcessRunner>,
        backend: Arc<dyn IndexBackend>,
    ) -> Result<Self> {
        config.validate()?;

        std::fs::create_dir_all(&config.unpacked_path).map_err(|e| {
            ImporterError::storage_io(
                format!("creating {}", config.unpacked_path.display()),
                &e,
            )
        })?;

        let staging = tempfile::Builder::new()
            .prefix("quarry-importer")
            .tempdir()
            .map_err(|e| ImporterError::storage_io("creating staging directory", &e))?;

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let filter = FilterConfig {
            max_file_size: config.max_file_size,
        };

        Ok(Self {
            config,
            filter,
            staging,
            engine,
            runner,
            backend,
            queue_tx,
            queue_rx: std::sync::Mutex::new(Some(queue_rx)),
            merge_gate: Arc::new(Semaphore::new(1)),
        })
    }

    /// The resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// STORE: the canonical store root.
    #[must_use]
    pub fn store(&self) -> &Path {
        &self.config.unpacked_path
    }

    /// STAGE: the upload staging area.
    #[must_use]
    pub fn staging_path(&self) -> &Path {
        self.staging.path()
    }

    /// The index engine shards are built with.
    #[must_use]
    pub fn engine(&self) -> Arc<dyn IndexEngine> {
        Arc::clone(&self.engine)
    }

    /// The query backend merged shards are swapped into.
    #[must_use]
    pub fn backend(&self) -> Arc<dyn IndexBackend> {
        Arc::clone(&self.backend)
    }

    /// The single-permit gate serializing merges.
    #[must_use]
    pub fn merge_gate(&self) -> &Arc<Semaphore> {
        &self.merge_gate
    }

    /// Hands a freshly uploaded descriptor path (`<pkg>/<file>`) to the
    /// worker pool.
    pub fn enqueue(&self, descriptor: String) {
        if self.queue_tx.send(descriptor).is_err() {
            tracing::error!("ingest queue is closed; descriptor dropped");
        }
    }

    /// Spawns the worker pool draining the ingest queue.
    ///
    /// Call once after construction; later calls are no-ops.
    pub fn spawn_workers(self: &Arc<Self>) {
        let receiver = self
            .queue_rx
            .lock()
            .expect("queue receiver lock")
            .take();
        let Some(receiver) = receiver else {
            tracing::warn!("worker pool already running");
            return;
        };

        let receiver = Arc::new(Mutex::new(receiver));
        for _ in 0..self.config.workers {
            let importer = Arc::clone(self);
            let receiver = Arc::clone(&receiver);
            tokio::spawn(run_worker(importer, receiver));
        }
        tracing::info!(workers = self.config.workers, "worker pool started");
    }

    /// Detaches the queue receiver so tests can observe enqueued work
    /// without spawning the pool.
    #[cfg(test)]
    pub(crate) fn take_queue_receiver(&self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.queue_rx.lock().expect("queue receiver lock").take()
    }

    /// Unpacks and indexes one package, then clears its staging tree.
    ///
    /// Failures never escape: they are logged and counted so the worker
    /// loop survives every bad package.
    pub(crate) async fn process_descriptor(&self, descriptor: &str) {
        let Some(pkg) = descriptor_package(descriptor) else {
            tracing::warn!(descriptor, "descriptor path has no package component");
            return;
        };
        let pkg = pkg.to_string();
        let span = package_span("import", &pkg);

        async {
            tracing::info!("unpacking");
            let package_staging = self.staging.path().join(&pkg);
            let unpacked = package_staging.join(&pkg);

            // Delete previous attempts, if any.
            if let Err(e) = tokio::fs::remove_dir_all(&unpacked).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(error = %e, "removing stale unpacked tree");
                }
            }

            let descriptor_path = self.staging.path().join(descriptor);
            if let Err(e) = unpack(self.runner.as_ref(), &descriptor_path, &unpacked).await {
                tracing::warn!(error = %e, "skipping package: unpack failed");
                crate::metrics::record_extract_failure();
                self.clear_staging(&package_staging).await;
                return;
            }
            crate::metrics::record_extract_success();

            let engine = Arc::clone(&self.engine);
            let staging_root = self.staging.path().to_path_buf();
            let store = self.config.unpacked_path.clone();
            let filter = self.filter.clone();
            let debug_skip = self.config.debug_skip;
            let worker_pkg = pkg.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                index_package(
                    &worker_pkg,
                    &staging_root,
                    &store,
                    engine.as_ref(),
                    &filter,
                    debug_skip,
                )
            })
            .await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "indexing failed");
                    crate::metrics::record_index_failure();
                }
                Err(e) => {
                    tracing::error!(error = %e, "indexing task panicked");
                    crate::metrics::record_index_failure();
                }
            }

            self.clear_staging(&package_staging).await;
        }
        .instrument(span)
        .await;
    }

    async fn clear_staging(&self, package_staging: &Path) {
        if let Err(e) = tokio::fs::remove_dir_all(package_staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %package_staging.display(),
                    error = %e,
                    "removing package staging tree"
                );
            }
        }
    }
}

/// `<pkg>/<file>` → `<pkg>`.
fn descriptor_package(descriptor: &str) -> Option<&str> {
    Path::new(descriptor)
        .parent()
        .and_then(Path::file_name)
        .and_then(OsStr::to_str)
        .filter(|pkg| !pkg.is_empty())
}

/// One worker: drains the ingest queue until the importer shuts down.
async fn run_worker(importer: Arc<Importer>, receiver: Arc<Mutex<mpsc::UnboundedReceiver<String>>>) {
    loop {
        let next = { receiver.lock().await.recv().await };
        let Some(descriptor) = next else {
            break;
        };
        importer.process_descriptor(&descriptor).await;
    }
}
