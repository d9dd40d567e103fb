//! The narrow interface the ingest pipeline consumes.
//!
//! The pipeline only ever needs to create a shard builder, concatenate
//! shards, and let the query backend open the result. Expressing that as
//! traits keeps the pipeline decoupled from the shard format and lets
//! tests substitute failing implementations.

use std::path::{Path, PathBuf};

use crate::concat::concat_shards;
use crate::error::Result;
use crate::shard::TrigramShardBuilder;

/// Builds one shard, file by file.
pub trait ShardBuilder: Send {
    /// Reads the file at `source` and records it under `stored_name`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::FileRejected`](crate::IndexError::FileRejected)
    /// for files that must not be indexed; callers are expected to drop the
    /// file and continue.
    fn add_file(&mut self, source: &Path, stored_name: &str) -> Result<()>;

    /// Writes the shard to disk and consumes the builder.
    ///
    /// # Errors
    ///
    /// Fails if the shard cannot be written.
    fn flush(self: Box<Self>) -> Result<()>;
}

/// Creates shard builders and merges finished shards.
pub trait IndexEngine: Send + Sync {
    /// Opens a new builder whose shard will be written to `path` on flush.
    ///
    /// # Errors
    ///
    /// Fails if a builder cannot be created for `path`.
    fn create(&self, path: &Path) -> Result<Box<dyn ShardBuilder>>;

    /// Concatenates `inputs` into a single shard at `output`, returning the
    /// merged document count.
    ///
    /// # Errors
    ///
    /// Fails if any input cannot be read or the output cannot be written.
    fn concat(&self, output: &Path, inputs: &[PathBuf]) -> Result<usize>;
}

/// The file-backed trigram implementation of [`IndexEngine`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TrigramEngine;

impl ShardBuilder for TrigramShardBuilder {
    fn add_file(&mut self, source: &Path, stored_name: &str) -> Result<()> {
        TrigramShardBuilder::add_file(self, source, stored_name)
    }

    fn flush(self: Box<Self>) -> Result<()> {
        TrigramShardBuilder::flush(*self)
    }
}

impl IndexEngine for TrigramEngine {
    fn create(&self, path: &Path) -> Result<Box<dyn ShardBuilder>> {
        Ok(Box::new(TrigramShardBuilder::new(path)))
    }

    fn concat(&self, output: &Path, inputs: &[PathBuf]) -> Result<usize> {
        concat_shards(output, inputs)
    }
}
