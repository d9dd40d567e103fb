//! Client for the index backend's `ReplaceIndex` RPC.
//!
//! After a steady-state merge the importer does not touch `full.idx`
//! itself: it hands the backend the basename of the freshly merged shard
//! and the backend opens and adopts it. The transport is HTTPS with a
//! client-certificate identity.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ImporterError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Request body for the `ReplaceIndex` RPC.
///
/// `replacement_path` is the basename, not the full path: importer and
/// backend share the store directory and the backend resolves names
/// against its own view of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceIndexRequest {
    /// Basename of the merged shard inside the shared store.
    pub replacement_path: String,
}

/// The query backend the importer swaps merged shards into.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Asks the backend to adopt the shard named `replacement` in the
    /// shared store.
    ///
    /// # Errors
    ///
    /// Returns [`ImporterError::Backend`] if the backend cannot be reached
    /// or refuses the swap. Callers treat this as fatal.
    async fn replace_index(&self, replacement: &str) -> Result<()>;
}

/// HTTPS implementation of [`IndexBackend`].
#[derive(Debug, Clone)]
pub struct HttpIndexBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpIndexBackend {
    /// Creates a client targeting `base_url`, optionally presenting the
    /// PEM client identity at `tls_cert_path` + `tls_key_path`.
    ///
    /// # Errors
    ///
    /// Returns [`ImporterError::Backend`] if the identity cannot be loaded
    /// or the HTTP client cannot be constructed.
    pub fn new(
        base_url: impl Into<String>,
        tls_cert_path: Option<&Path>,
        tls_key_path: Option<&Path>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);

        if let (Some(cert), Some(key)) = (tls_cert_path, tls_key_path) {
            let mut pem = std::fs::read(cert).map_err(|e| {
                ImporterError::backend(format!("reading {}: {e}", cert.display()))
            })?;
            pem.extend(std::fs::read(key).map_err(|e| {
                ImporterError::backend(format!("reading {}: {e}", key.display()))
            })?);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| ImporterError::backend(format!("loading TLS identity: {e}")))?;
            builder = builder.identity(identity);
        }

        let client = builder
            .build()
            .map_err(|e| ImporterError::backend(format!("building HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn replace_index_url(&self) -> String {
        format!(
            "{}/internal/replace-index",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl IndexBackend for HttpIndexBackend {
    async fn replace_index(&self, replacement: &str) -> Result<()> {
        let request = ReplaceIndexRequest {
            replacement_path: replacement.to_string(),
        };

        let response = self
            .client
            .post(self.replace_index_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| ImporterError::backend(format!("ReplaceIndex request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ImporterError::backend(format!(
            "ReplaceIndex failed ({status}): {body}"
        )))
    }
}
