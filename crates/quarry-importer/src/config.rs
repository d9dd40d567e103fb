//! Importer configuration.
//!
//! Flags parse via clap with environment fallbacks and convert into an
//! owned [`Config`] consumed by the [`Importer`](crate::importer::Importer)
//! constructor; nothing reads flags from globals.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use quarry_core::LogFormat;

use crate::error::{ImporterError, Result};

/// Default ceiling on indexable file size: anything larger is generated
/// content or data, not source.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Quarry package importer.
#[derive(Debug, Parser)]
#[command(name = "quarry-importer")]
#[command(about = "Accepts source packages via HTTP, unpacks, strips and indexes them")]
#[command(version)]
pub struct Args {
    /// Listen address for the HTTP surface ([host]:port).
    #[arg(long, env = "QUARRY_LISTEN_ADDRESS", default_value = "[::]:21010")]
    pub listen_address: SocketAddr,

    /// Path to the unpacked sources (the canonical store).
    #[arg(long, env = "QUARRY_UNPACKED_PATH")]
    pub unpacked_path: PathBuf,

    /// Base URL of the index backend that adopts merged shards.
    #[arg(
        long,
        env = "QUARRY_INDEX_BACKEND_URL",
        default_value = "https://localhost:28081"
    )]
    pub index_backend_url: String,

    /// Path to a .pem file containing the TLS client certificate.
    #[arg(long, env = "QUARRY_TLS_CERT_PATH")]
    pub tls_cert_path: Option<PathBuf>,

    /// Path to a .pem file containing the TLS private key.
    #[arg(long, env = "QUARRY_TLS_KEY_PATH")]
    pub tls_key_path: Option<PathBuf>,

    /// Log a line for every file the filter excludes.
    #[arg(long, env = "QUARRY_DEBUG_SKIP")]
    pub debug_skip: bool,

    /// Largest file, in bytes, the filter keeps.
    #[arg(long, env = "QUARRY_MAX_FILE_SIZE", default_value_t = DEFAULT_MAX_FILE_SIZE)]
    pub max_file_size: u64,

    /// Worker pool size; defaults to the number of available cores.
    #[arg(long, env = "QUARRY_WORKERS")]
    pub workers: Option<usize>,

    /// Log output format.
    #[arg(long, env = "QUARRY_LOG_FORMAT", default_value = "json", value_parser = parse_log_format)]
    pub log_format: LogFormat,
}

fn parse_log_format(raw: &str) -> std::result::Result<LogFormat, String> {
    match raw {
        "json" => Ok(LogFormat::Json),
        "pretty" => Ok(LogFormat::Pretty),
        other => Err(format!("unknown log format {other:?} (json|pretty)")),
    }
}

/// Resolved importer configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address for the HTTP surface.
    pub listen_address: SocketAddr,
    /// The canonical store root.
    pub unpacked_path: PathBuf,
    /// Base URL of the index backend.
    pub index_backend_url: String,
    /// TLS client certificate for the backend RPC.
    pub tls_cert_path: Option<PathBuf>,
    /// TLS private key for the backend RPC.
    pub tls_key_path: Option<PathBuf>,
    /// Log every filter exclusion.
    pub debug_skip: bool,
    /// Filter size ceiling in bytes.
    pub max_file_size: u64,
    /// Worker pool size.
    pub workers: usize,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Config {
    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty worker pool or a TLS identity with
    /// only one of its two halves configured.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ImporterError::invalid_request(
                "workers must be at least 1",
            ));
        }
        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            return Err(ImporterError::invalid_request(
                "tls_cert_path and tls_key_path must be set together",
            ));
        }
        Ok(())
    }
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let workers = args.workers.unwrap_or_else(default_workers);
        Self {
            listen_address: args.listen_address,
            unpacked_path: args.unpacked_path,
            index_backend_url: args.index_backend_url,
            tls_cert_path: args.tls_cert_path,
            tls_key_path: args.tls_key_path,
            debug_skip: args.debug_skip,
            max_file_size: args.max_file_size,
            workers,
            log_format: args.log_format,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}
