//! The merge coordinator.
//!
//! Assembles all per-package shards into one and makes the query backend
//! adopt it. At most one merge runs at a time: the gate is a single-permit
//! semaphore acquired without blocking, so a second request fails fast
//! while the first is still running.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::OwnedSemaphorePermit;

use crate::error::{ImporterError, Result};
use crate::importer::Importer;
use crate::store::{MERGED_SHARD, MERGE_PREFIX, shard_paths};

/// What a merge run did.
#[derive(Debug)]
pub enum MergeOutcome {
    /// Fewer than two shards: nothing useful to merge.
    Skipped {
        /// How many shards the enumeration found.
        shards: usize,
    },
    /// No `full.idx` existed yet; the merged shard was renamed into place
    /// and no RPC was made.
    Bootstrapped,
    /// The backend was told to adopt the merged shard.
    Replaced {
        /// Basename of the shard handed to the backend.
        replacement: String,
    },
}

/// Starts a merge in the background, or fails fast if one is running.
///
/// # Errors
///
/// Returns [`ImporterError::MergeInProgress`] when the gate is held.
pub fn try_start_merge(importer: &Arc<Importer>) -> Result<()> {
    let permit = Arc::clone(importer.merge_gate())
        .try_acquire_owned()
        .map_err(|_| ImporterError::MergeInProgress)?;

    let importer = Arc::clone(importer);
    tokio::spawn(run_merge(importer, permit));
    Ok(())
}

/// Drives one merge while holding the gate permit.
///
/// A failed backend swap is fatal to the process: silently serving a stale
/// index would be worse than a crash and restart.
async fn run_merge(importer: Arc<Importer>, _permit: OwnedSemaphorePermit) {
    match merge_to_shard(&importer).await {
        Ok(MergeOutcome::Skipped { shards }) => {
            tracing::info!(shards, "nothing to merge");
        }
        Ok(MergeOutcome::Bootstrapped) => {
            tracing::info!("bootstrapped {MERGED_SHARD}");
        }
        Ok(MergeOutcome::Replaced { replacement }) => {
            tracing::info!(replacement = %replacement, "index backend adopted merged shard");
        }
        Err(e @ ImporterError::Backend { .. }) => {
            tracing::error!(error = %e, "index backend swap failed");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!(error = %e, "merge failed");
        }
    }
}

/// Enumerates shards, concatenates them into a `newshard*` temporary, and
/// publishes the result.
///
/// # Errors
///
/// Fails if the enumeration, the concatenation, the bootstrap rename, or
/// the backend RPC fails. Garbage collection running concurrently can
/// remove an enumerated shard under us; that surfaces here as a
/// concatenation failure and the merge is simply retried later.
pub async fn merge_to_shard(importer: &Importer) -> Result<MergeOutcome> {
    let store = importer.store();
    let inputs = shard_paths(store)?;

    crate::metrics::set_shard_count(inputs.len());
    tracing::info!(shards = inputs.len(), "enumerated index shards");
    if inputs.len() < 2 {
        return Ok(MergeOutcome::Skipped {
            shards: inputs.len(),
        });
    }

    // The temporary lives in the store so the eventual rename stays within
    // one filesystem, and its name matches no enumerator's idea of a shard.
    let temp = tempfile::Builder::new()
        .prefix(MERGE_PREFIX)
        .tempfile_in(store)
        .map_err(|e| ImporterError::storage_io("creating merge temporary", &e))?;
    let output: PathBuf = temp
        .into_temp_path()
        .keep()
        .map_err(|e| ImporterError::storage(format!("keeping merge temporary: {e}")))?;

    let engine = importer.engine();
    let concat_output = output.clone();
    let concat_inputs = inputs.clone();
    let started = Instant::now();
    let documents =
        tokio::task::spawn_blocking(move || engine.concat(&concat_output, &concat_inputs))
            .await
            .map_err(|e| ImporterError::storage(format!("merge task failed: {e}")))??;
    tracing::info!(
        documents,
        elapsed_ms = started.elapsed().as_millis() as u64,
        shard = %output.display(),
        "merged shards"
    );

    // On initial deployment there is no backend serving full.idx yet: just
    // move the merged shard into place.
    let merged = store.join(MERGED_SHARD);
    if !merged.exists() {
        std::fs::rename(&output, &merged).map_err(|e| {
            ImporterError::storage_io(format!("publishing {}", merged.display()), &e)
        })?;
        crate::metrics::record_merge_success();
        return Ok(MergeOutcome::Bootstrapped);
    }

    let replacement = output
        .file_name()
        .and_then(std::ffi::OsStr::to_str)
        .ok_or_else(|| ImporterError::storage("merge temporary has no usable name"))?
        .to_string();
    importer.backend().replace_index(&replacement).await?;
    crate::metrics::record_merge_success();
    Ok(MergeOutcome::Replaced { replacement })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;

    use quarry_core::{LogFormat, SystemRunner};
    use quarry_index::{Shard, TrigramEngine, TrigramShardBuilder};

    use crate::backend::IndexBackend;
    use crate::config::Config;

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingBackend {
        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl IndexBackend for RecordingBackend {
        async fn replace_index(&self, replacement: &str) -> crate::error::Result<()> {
            self.calls
                .lock()
                .expect("calls lock")
                .push(replacement.to_string());
            if self.fail {
                Err(ImporterError::backend("scripted refusal"))
            } else {
                Ok(())
            }
        }
    }

    fn test_config(store: &Path) -> Config {
        Config {
            listen_address: "127.0.0.1:0".parse().expect("addr"),
            unpacked_path: store.to_path_buf(),
            index_backend_url: "http://localhost:0".to_string(),
            tls_cert_path: None,
            tls_key_path: None,
            debug_skip: false,
            max_file_size: crate::config::DEFAULT_MAX_FILE_SIZE,
            workers: 1,
            log_format: LogFormat::Pretty,
        }
    }

    fn test_importer(store: &Path, backend: Arc<RecordingBackend>) -> Arc<Importer> {
        Arc::new(
            Importer::new(
                test_config(store),
                Arc::new(TrigramEngine),
                Arc::new(SystemRunner),
                backend,
            )
            .expect("build importer"),
        )
    }

    fn write_package_shard(store: &Path, pkg: &str, content: &str) -> Result<()> {
        let source = store.join(format!("{pkg}.src"));
        fs::write(&source, content)?;
        let mut builder = TrigramShardBuilder::new(store.join(format!("{pkg}.idx")));
        builder.add_file(&source, &format!("{pkg}/main.c"))?;
        builder.flush()?;
        fs::remove_file(source)?;
        Ok(())
    }

    #[tokio::test]
    async fn below_threshold_merge_is_a_no_op() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_package_shard(dir.path(), "solo_1.0-1", "int solo;\n")?;
        let backend = Arc::new(RecordingBackend::default());
        let importer = test_importer(dir.path(), Arc::clone(&backend));

        let outcome = merge_to_shard(&importer).await?;
        assert!(matches!(outcome, MergeOutcome::Skipped { shards: 1 }));
        assert!(!dir.path().join(MERGED_SHARD).exists());
        assert!(backend.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn in_flight_files_do_not_count_as_shards() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_package_shard(dir.path(), "solo_1.0-1", "int solo;\n")?;
        fs::write(dir.path().join("other_2.0-1.tmp"), b"half written")?;
        fs::write(dir.path().join("newshardaaaaaa"), b"stale merge")?;
        let backend = Arc::new(RecordingBackend::default());
        let importer = test_importer(dir.path(), backend);

        let outcome = merge_to_shard(&importer).await?;
        assert!(matches!(outcome, MergeOutcome::Skipped { shards: 1 }));
        Ok(())
    }

    #[tokio::test]
    async fn bootstrap_merge_renames_and_makes_no_rpc() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_package_shard(dir.path(), "alpha_1.0-1", "int alpha;\n")?;
        write_package_shard(dir.path(), "beta_2.0-1", "int beta;\n")?;
        let backend = Arc::new(RecordingBackend::default());
        let importer = test_importer(dir.path(), Arc::clone(&backend));

        let outcome = merge_to_shard(&importer).await?;
        assert!(matches!(outcome, MergeOutcome::Bootstrapped));
        assert!(backend.calls().is_empty());

        let merged = Shard::open(&dir.path().join(MERGED_SHARD))?;
        let mut documents = merged.documents().to_vec();
        documents.sort();
        assert_eq!(documents, ["alpha_1.0-1/main.c", "beta_2.0-1/main.c"]);
        Ok(())
    }

    #[tokio::test]
    async fn steady_state_merge_hands_the_backend_a_basename() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_package_shard(dir.path(), "alpha_1.0-1", "int alpha;\n")?;
        write_package_shard(dir.path(), "beta_2.0-1", "int beta;\n")?;
        let backend = Arc::new(RecordingBackend::default());
        let importer = test_importer(dir.path(), Arc::clone(&backend));

        // First merge bootstraps full.idx.
        merge_to_shard(&importer).await?;
        let before = fs::read(dir.path().join(MERGED_SHARD))?;

        let outcome = merge_to_shard(&importer).await?;
        let MergeOutcome::Replaced { replacement } = outcome else {
            panic!("expected a backend swap, got {outcome:?}");
        };
        assert!(replacement.starts_with(MERGE_PREFIX));
        assert_eq!(backend.calls(), [replacement.clone()]);

        // The backend owns the swap: full.idx on disk is untouched and the
        // merged temporary is still there for it to open.
        assert_eq!(fs::read(dir.path().join(MERGED_SHARD))?, before);
        assert!(dir.path().join(&replacement).exists());
        Ok(())
    }

    #[tokio::test]
    async fn backend_refusal_is_an_error_and_leaves_full_idx_alone() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_package_shard(dir.path(), "alpha_1.0-1", "int alpha;\n")?;
        write_package_shard(dir.path(), "beta_2.0-1", "int beta;\n")?;
        fs::write(dir.path().join(MERGED_SHARD), b"previously merged")?;
        let backend = Arc::new(RecordingBackend::failing());
        let importer = test_importer(dir.path(), backend);

        let err = merge_to_shard(&importer).await.expect_err("backend refused");
        assert!(matches!(err, ImporterError::Backend { .. }));
        assert_eq!(
            fs::read(dir.path().join(MERGED_SHARD))?,
            b"previously merged"
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_gate_rejects_a_second_merge() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let backend = Arc::new(RecordingBackend::default());
        let importer = test_importer(dir.path(), backend);

        let held = Arc::clone(importer.merge_gate())
            .try_acquire_owned()
            .expect("gate starts free");

        let err = try_start_merge(&importer).expect_err("gate is held");
        assert!(matches!(err, ImporterError::MergeInProgress));

        drop(held);
        try_start_merge(&importer)?;
        Ok(())
    }
}
