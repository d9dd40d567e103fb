//! `quarry-importer` binary entrypoint.
//!
//! Parses configuration, wires the pipeline together, starts the worker
//! pool and serves the HTTP surface.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use quarry_core::{SystemRunner, init_logging};
use quarry_importer::config::{Args, Config};
use quarry_importer::{HttpIndexBackend, Importer};
use quarry_index::TrigramEngine;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from(Args::parse());
    init_logging(config.log_format);
    quarry_importer::metrics::init_metrics();

    let backend = HttpIndexBackend::new(
        config.index_backend_url.clone(),
        config.tls_cert_path.as_deref(),
        config.tls_key_path.as_deref(),
    )?;

    let importer = Arc::new(Importer::new(
        config,
        Arc::new(TrigramEngine),
        Arc::new(SystemRunner),
        Arc::new(backend),
    )?);

    importer.spawn_workers();
    quarry_importer::server::serve(importer).await?;
    Ok(())
}
