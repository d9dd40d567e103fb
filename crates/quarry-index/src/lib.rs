//! # quarry-index
//!
//! Trigram index shards for the quarry source-code search services.
//!
//! A *shard* is a single on-disk file mapping every trigram (3-byte
//! substring) that occurs in a set of source files to the documents it
//! occurs in. The importer builds one shard per package and periodically
//! concatenates all per-package shards into one large shard served by the
//! query backend.
//!
//! The crate exposes two layers:
//!
//! - [`IndexEngine`] / [`ShardBuilder`]: the narrow interface the ingest
//!   pipeline consumes. Keeping it a trait lets pipeline tests inject
//!   failing fakes.
//! - [`TrigramEngine`], [`Shard`]: the file-backed implementation.
//!
//! Query evaluation over shards belongs to the query backend and is out of
//! scope here; [`Shard`] only supports opening a shard and enumerating its
//! contents.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod concat;
pub mod engine;
pub mod error;
pub mod shard;

pub use concat::concat_shards;
pub use engine::{IndexEngine, ShardBuilder, TrigramEngine};
pub use error::{IndexError, Result};
pub use shard::{Shard, Trigram, TrigramShardBuilder};
