//! Materializes a package tree from its descriptor.
//!
//! The heavy lifting is delegated to external tools: the source extractor
//! reconstructs the tree from the descriptor and its archives, and any
//! nested tarball left inside the tree is expanded in place with tar so we
//! never have to care about compression formats ourselves.

use std::path::Path;

use quarry_core::ProcessRunner;

use crate::error::{ImporterError, Result};

/// The source extraction tool.
pub const SOURCE_EXTRACTOR: &str = "dpkg-source";

/// The nested-archive extraction tool.
pub const ARCHIVE_EXTRACTOR: &str = "tar";

/// Unpacks the package described by `descriptor` into `target`.
///
/// Both child processes forward their stderr to the importer's own
/// diagnostic stream. On failure, partial output may remain in `target`;
/// the caller owns cleanup.
///
/// # Errors
///
/// Returns [`ImporterError::Extract`] if either tool fails and
/// [`ImporterError::Storage`] for filesystem trouble around the target.
pub async fn unpack(
    runner: &dyn ProcessRunner,
    descriptor: &Path,
    target: &Path,
) -> Result<()> {
    let package_dir = descriptor.parent().map(Path::to_path_buf);
    let descriptor = path_str(descriptor)?;
    let target_str = path_str(target)?;

    runner
        .run(
            SOURCE_EXTRACTOR,
            &["--no-copy", "--no-check", "-x", descriptor, target_str],
            package_dir.as_deref(),
        )
        .await?;

    expand_nested_tarballs(runner, target).await
}

/// Expands any regular file whose name contains `.tar.` in place, then
/// removes the archive itself.
async fn expand_nested_tarballs(runner: &dyn ProcessRunner, target: &Path) -> Result<()> {
    let mut entries = tokio::fs::read_dir(target)
        .await
        .map_err(|e| ImporterError::storage_io(format!("reading {}", target.display()), &e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ImporterError::storage_io(format!("reading {}", target.display()), &e))?
    {
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| ImporterError::storage_io(entry.path().display(), &e))?;
        if !file_type.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.contains(".tar.") {
            continue;
        }

        runner
            .run(ARCHIVE_EXTRACTOR, &["xf", &name], Some(target))
            .await?;
        // The archive's contents are what we index; the blob itself would
        // only be filtered out later anyway.
        tokio::fs::remove_file(entry.path())
            .await
            .map_err(|e| ImporterError::storage_io(entry.path().display(), &e))?;
    }

    Ok(())
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| ImporterError::storage(format!("non-UTF-8 path: {}", path.display())))
}
