//! # quarry-importer
//!
//! Accepts source packages via HTTP, unpacks, strips and indexes them.
//!
//! The importer is the write side of the quarry search system. Upload
//! agents PUT a package's archives and finally its descriptor; a worker
//! pool unpacks each completed package, filters out everything that is not
//! source, copies the kept files into the canonical store, and publishes a
//! per-package trigram shard. On request, all per-package shards are
//! merged into one and the query backend is told to adopt the result.
//!
//! Publication is always an atomic rename within the store, and every
//! enumerator filters by suffix, so readers never observe a partially
//! written shard.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

pub mod backend;
pub mod config;
pub mod error;
pub mod filter;
pub mod importer;
pub mod indexer;
pub mod merge;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod store;
pub mod unpack;

pub use backend::{HttpIndexBackend, IndexBackend};
pub use config::{Args, Config};
pub use error::{ImporterError, Result};
pub use importer::Importer;
