//! Per-package indexing: walk the unpacked tree, filter, index, copy.
//!
//! A file is offered to the builder before it is copied: a file the index
//! rejects never reaches the store, so the store tree and the shard always
//! describe exactly the same set of files.

use std::path::Path;

use quarry_index::IndexEngine;
use walkdir::WalkDir;

use crate::error::{ImporterError, Result};
use crate::filter::{FilterConfig, skip_reason};
use crate::store::{PENDING_SUFFIX, SHARD_SUFFIX};

/// Builds `STORE/<pkg>.idx` and `STORE/<pkg>/…` from the unpacked tree at
/// `STAGE/<pkg>/<pkg>/`.
///
/// The shard is written to `<pkg>.tmp` first and renamed into place as the
/// single publication step, so a concurrent merge never opens a partially
/// written index.
///
/// # Errors
///
/// Fails on filesystem errors in the walk, the copies, or the final
/// rename, and on a shard flush failure. Per-file indexing errors are not
/// fatal: the offending file is deleted and the walk continues.
pub fn index_package(
    pkg: &str,
    staging: &Path,
    store: &Path,
    engine: &dyn IndexEngine,
    filter: &FilterConfig,
    debug_skip: bool,
) -> Result<()> {
    tracing::info!(pkg, "indexing");
    let package_root = staging.join(pkg);
    let unpacked = package_root.join(pkg);

    std::fs::create_dir_all(store)
        .map_err(|e| ImporterError::storage_io(format!("creating {}", store.display()), &e))?;

    let pending = store.join(format!("{pkg}{PENDING_SUFFIX}"));
    let mut builder = engine.create(&pending)?;

    let mut walker = WalkDir::new(&unpacked).into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| ImporterError::storage(format!("walking {pkg}: {e}")))?;
        let path = entry.path();
        let meta = entry
            .metadata()
            .map_err(|e| ImporterError::storage(format!("stat {}: {e}", path.display())))?;

        let name = entry.file_name().to_string_lossy();
        let parent = path.parent().unwrap_or(&unpacked);
        if let Some(reason) = skip_reason(&meta, parent, &name, filter) {
            if debug_skip {
                tracing::debug!(path = %path.display(), %reason, "skipping");
            }
            if meta.is_dir() {
                std::fs::remove_dir_all(path).map_err(|e| {
                    ImporterError::storage_io(format!("removing {}", path.display()), &e)
                })?;
                walker.skip_current_dir();
            } else {
                std::fs::remove_file(path).map_err(|e| {
                    ImporterError::storage_io(format!("removing {}", path.display()), &e)
                })?;
            }
            continue;
        }

        if !meta.is_file() {
            continue;
        }

        let rel = path
            .strip_prefix(&package_root)
            .map_err(|_| ImporterError::storage(format!("{} escaped staging", path.display())))?;

        // Names that are not valid UTF-8 would break every JSON reply
        // downstream. Skip the file but keep it on disk; the rest of the
        // package is still useful.
        let Some(stored_name) = rel.to_str() else {
            tracing::warn!(path = %path.display(), "skipping file with non-UTF-8 name");
            continue;
        };

        if let Err(e) = builder.add_file(path, stored_name) {
            tracing::warn!(pkg, file = stored_name, error = %e, "could not index file");
            std::fs::remove_file(path).map_err(|e| {
                ImporterError::storage_io(format!("removing {}", path.display()), &e)
            })?;
            continue;
        }

        let output = store.join(rel);
        if let Some(dir) = output.parent() {
            std::fs::create_dir_all(dir).map_err(|e| {
                ImporterError::storage_io(format!("creating {}", dir.display()), &e)
            })?;
        }
        std::fs::copy(path, &output).map_err(|e| {
            ImporterError::storage_io(
                format!("copying {} to {}", path.display(), output.display()),
                &e,
            )
        })?;
    }

    builder.flush()?;

    let published = store.join(format!("{pkg}{SHARD_SUFFIX}"));
    std::fs::rename(&pending, &published).map_err(|e| {
        ImporterError::storage_io(format!("publishing {}", published.display()), &e)
    })?;

    crate::metrics::record_index_success();
    tracing::info!(pkg, "indexed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use quarry_index::{Shard, TrigramEngine};
    use std::fs;
    use std::path::PathBuf;

    const PKG: &str = "hello_2.12-1";

    /// Lays out `STAGE/<pkg>/<pkg>/` with the given files.
    fn stage_tree(staging: &Path, files: &[(&str, &[u8])]) -> Result<PathBuf> {
        let unpacked = staging.join(PKG).join(PKG);
        fs::create_dir_all(&unpacked)?;
        for (rel, content) in files {
            let path = unpacked.join(rel);
            fs::create_dir_all(path.parent().expect("parent"))?;
            fs::write(path, content)?;
        }
        Ok(unpacked)
    }

    fn store_files(store: &Path) -> Vec<String> {
        let mut found: Vec<String> = WalkDir::new(store.join(PKG))
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                e.path()
                    .strip_prefix(store)
                    .expect("store-relative")
                    .to_str()
                    .expect("utf-8")
                    .to_string()
            })
            .collect();
        found.sort();
        found
    }

    #[test]
    fn store_and_shard_hold_exactly_the_kept_files() -> Result<()> {
        let staging = tempfile::tempdir()?;
        let store = tempfile::tempdir()?;
        let unpacked = stage_tree(
            staging.path(),
            &[
                ("src/main.c", b"int main() { return 0; }\n"),
                ("src/util.o", b"\x7fELF object"),
                ("README", b"hello, a friendly greeter\n"),
            ],
        )?;
        fs::create_dir_all(unpacked.join(".git"))?;
        fs::write(unpacked.join(".git/HEAD"), b"ref: refs/heads/main\n")?;

        index_package(
            PKG,
            staging.path(),
            store.path(),
            &TrigramEngine,
            &FilterConfig::default(),
            false,
        )?;

        let shard_path = store.path().join(format!("{PKG}.idx"));
        assert!(shard_path.exists());
        assert!(!store.path().join(format!("{PKG}.tmp")).exists());

        let mut indexed = Shard::open(&shard_path)?.documents().to_vec();
        indexed.sort();
        assert_eq!(
            indexed,
            [format!("{PKG}/README"), format!("{PKG}/src/main.c")]
        );
        // The store tree and the shard agree exactly.
        assert_eq!(store_files(store.path()), indexed);

        // Filtered entries were deleted from staging.
        assert!(!unpacked.join(".git").exists());
        assert!(!unpacked.join("src/util.o").exists());
        Ok(())
    }

    #[test]
    fn builder_rejections_remove_the_file_and_continue() -> Result<()> {
        let staging = tempfile::tempdir()?;
        let store = tempfile::tempdir()?;
        let minified = format!("var x={};\n", "1".repeat(3000));
        let unpacked = stage_tree(
            staging.path(),
            &[
                ("lib/app.js", minified.as_bytes()),
                ("lib/app.c", b"int app;\n"),
            ],
        )?;

        index_package(
            PKG,
            staging.path(),
            store.path(),
            &TrigramEngine,
            &FilterConfig::default(),
            false,
        )?;

        let shard = Shard::open(&store.path().join(format!("{PKG}.idx")))?;
        assert_eq!(shard.documents(), [format!("{PKG}/lib/app.c")]);
        assert_eq!(store_files(store.path()), [format!("{PKG}/lib/app.c")]);
        assert!(!unpacked.join("lib/app.js").exists());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_are_skipped_without_deletion() -> Result<()> {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let staging = tempfile::tempdir()?;
        let store = tempfile::tempdir()?;
        let unpacked = stage_tree(staging.path(), &[("src/ok.c", b"int ok;\n")])?;

        let weird = unpacked.join(OsStr::from_bytes(b"reconstruct\xeeon2.xal"));
        fs::write(&weird, b"level data in latin-1 name\n")?;

        index_package(
            PKG,
            staging.path(),
            store.path(),
            &TrigramEngine,
            &FilterConfig::default(),
            false,
        )?;

        let shard = Shard::open(&store.path().join(format!("{PKG}.idx")))?;
        assert_eq!(shard.documents(), [format!("{PKG}/src/ok.c")]);
        // Still in staging: skipped, not deleted.
        assert!(weird.exists());
        Ok(())
    }

    #[test]
    fn empty_tree_still_publishes_a_shard() -> Result<()> {
        let staging = tempfile::tempdir()?;
        let store = tempfile::tempdir()?;
        stage_tree(staging.path(), &[])?;

        index_package(
            PKG,
            staging.path(),
            store.path(),
            &TrigramEngine,
            &FilterConfig::default(),
            false,
        )?;

        let shard = Shard::open(&store.path().join(format!("{PKG}.idx")))?;
        assert!(shard.documents().is_empty());
        Ok(())
    }
}
