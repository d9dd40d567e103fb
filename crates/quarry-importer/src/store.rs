//! The canonical store: naming rules and enumeration.
//!
//! The store directory is shared by the indexer (writes `.tmp`, renames to
//! `.idx`), the merge coordinator (writes `newshard*`, may rename to
//! `full.idx`), and garbage collection (deletes). Safety rests on two
//! rules: publication happens only via atomic rename within the store, and
//! every enumerator filters by suffix so in-flight files are invisible.

use std::path::{Path, PathBuf};

use crate::error::{ImporterError, Result};

/// The merged shard served by the query backend.
pub const MERGED_SHARD: &str = "full.idx";

/// Suffix of published shards.
pub const SHARD_SUFFIX: &str = ".idx";

/// Suffix of in-flight per-package indexes. Never consumed by enumerators.
pub const PENDING_SUFFIX: &str = ".tmp";

/// Name prefix of in-flight merged indexes. Never consumed by enumerators.
pub const MERGE_PREFIX: &str = "newshard";

/// Every directory entry name in the store.
///
/// A store that does not exist yet reads as empty. Names that are not
/// valid UTF-8 are ignored; nothing the importer writes produces them.
///
/// # Errors
///
/// Returns [`ImporterError::Storage`] for any other enumeration failure.
pub fn entry_names(store: &Path) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(store) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(ImporterError::storage_io(
                format!("reading {}", store.display()),
                &e,
            ));
        }
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| ImporterError::storage_io(format!("reading {}", store.display()), &e))?;
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort_unstable();
    Ok(names)
}

fn is_package_shard(name: &str) -> bool {
    name.ends_with(SHARD_SUFFIX) && name != MERGED_SHARD
}

/// Names of all published per-package shards (`<pkg>.idx`).
///
/// # Errors
///
/// Propagates enumeration failures from [`entry_names`].
pub fn shard_names(store: &Path) -> Result<Vec<String>> {
    Ok(entry_names(store)?
        .into_iter()
        .filter(|name| is_package_shard(name))
        .collect())
}

/// Full paths of all published per-package shards.
///
/// # Errors
///
/// Propagates enumeration failures from [`entry_names`].
pub fn shard_paths(store: &Path) -> Result<Vec<PathBuf>> {
    Ok(shard_names(store)?
        .into_iter()
        .map(|name| store.join(name))
        .collect())
}

/// Names of all indexed packages: shard names with the suffix stripped.
///
/// # Errors
///
/// Propagates enumeration failures from [`entry_names`].
pub fn package_names(store: &Path) -> Result<Vec<String>> {
    Ok(shard_names(store)?
        .into_iter()
        .map(|mut name| {
            name.truncate(name.len() - SHARD_SUFFIX.len());
            name
        })
        .collect())
}

/// Removes `pkg` from the store: its tree and its shard.
///
/// An entry named exactly `pkg` must exist; `.idx` entries do not count,
/// so packages that were uploaded but never indexed stay collectable. A
/// missing `<pkg>.idx` is tolerated for the same reason.
///
/// # Errors
///
/// Returns [`ImporterError::UnknownPackage`] if no such entry exists and
/// [`ImporterError::Storage`] if removal fails.
pub fn remove_package(store: &Path, pkg: &str) -> Result<()> {
    let found = entry_names(store)?
        .iter()
        .any(|name| name == pkg && !name.ends_with(SHARD_SUFFIX));
    if !found {
        return Err(ImporterError::UnknownPackage(pkg.to_string()));
    }

    let tree = store.join(pkg);
    let result = if tree.is_dir() {
        std::fs::remove_dir_all(&tree)
    } else {
        std::fs::remove_file(&tree)
    };
    result.map_err(|e| ImporterError::storage_io(format!("removing {}", tree.display()), &e))?;

    let shard = store.join(format!("{pkg}{SHARD_SUFFIX}"));
    match std::fs::remove_file(&shard) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ImporterError::storage_io(
            format!("removing {}", shard.display()),
            &e,
        )),
    }
}
