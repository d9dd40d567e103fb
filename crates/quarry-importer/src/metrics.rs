//! Metrics for the importer.
//!
//! Counters for every pipeline stage plus a gauge of the shard count,
//! exported in Prometheus format from `GET /metrics`.

use std::sync::OnceLock;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Successful package uploads (one per stored file).
pub const UPLOADS_SUCCESSFUL: &str = "quarry_package_uploads_successful_total";

/// Failed package uploads.
pub const UPLOADS_FAILED: &str = "quarry_package_uploads_failed_total";

/// Successful source extractions.
pub const EXTRACTS_SUCCESSFUL: &str = "quarry_source_extracts_successful_total";

/// Failed source extractions.
pub const EXTRACTS_FAILED: &str = "quarry_source_extracts_failed_total";

/// Successfully published per-package indexes.
pub const INDEXES_SUCCESSFUL: &str = "quarry_package_indexes_successful_total";

/// Per-package index builds that failed as a whole.
pub const INDEXES_FAILED: &str = "quarry_package_indexes_failed_total";

/// Successful merges.
pub const MERGES_SUCCESSFUL: &str = "quarry_merges_successful_total";

/// Successful garbage collections.
pub const GARBAGE_COLLECTS_SUCCESSFUL: &str = "quarry_garbage_collects_successful_total";

/// Number of per-package shards observed by the last merge enumeration.
pub const INDEX_SHARDS: &str = "quarry_index_shards";

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initializes the global metrics recorder with a Prometheus exporter.
///
/// Safe to call multiple times; subsequent calls are no-ops. The handle is
/// stored globally for the `/metrics` endpoint.
///
/// # Panics
///
/// Panics if the Prometheus recorder cannot be installed; the importer
/// should not start without its metrics.
#[allow(clippy::panic)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .unwrap_or_else(|e| panic!("failed to install prometheus recorder: {e}"));

            describe_counter!(UPLOADS_SUCCESSFUL, "Successful package uploads");
            describe_counter!(UPLOADS_FAILED, "Failed package uploads");
            describe_counter!(EXTRACTS_SUCCESSFUL, "Successful source extracts");
            describe_counter!(EXTRACTS_FAILED, "Failed source extracts");
            describe_counter!(INDEXES_SUCCESSFUL, "Successful package indexes");
            describe_counter!(INDEXES_FAILED, "Failed package indexes");
            describe_counter!(MERGES_SUCCESSFUL, "Successful merges");
            describe_counter!(
                GARBAGE_COLLECTS_SUCCESSFUL,
                "Successful garbage collects"
            );
            describe_gauge!(INDEX_SHARDS, "Number of per-package index shards");

            tracing::info!("Prometheus metrics recorder initialized");
            handle
        })
        .clone()
}

/// Returns the global Prometheus handle, if initialized.
#[must_use]
pub fn prometheus_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

/// Handler for the `/metrics` endpoint.
pub async fn serve_metrics() -> impl IntoResponse {
    prometheus_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain; charset=utf-8")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

/// Records a stored upload.
pub fn record_upload_success() {
    counter!(UPLOADS_SUCCESSFUL).increment(1);
}

/// Records a failed upload.
pub fn record_upload_failure() {
    counter!(UPLOADS_FAILED).increment(1);
}

/// Records a successful source extraction.
pub fn record_extract_success() {
    counter!(EXTRACTS_SUCCESSFUL).increment(1);
}

/// Records a failed source extraction.
pub fn record_extract_failure() {
    counter!(EXTRACTS_FAILED).increment(1);
}

/// Records a published per-package index.
pub fn record_index_success() {
    counter!(INDEXES_SUCCESSFUL).increment(1);
}

/// Records a per-package index build that failed as a whole.
pub fn record_index_failure() {
    counter!(INDEXES_FAILED).increment(1);
}

/// Records a completed merge.
pub fn record_merge_success() {
    counter!(MERGES_SUCCESSFUL).increment(1);
}

/// Records a completed garbage collection.
pub fn record_garbage_collect_success() {
    counter!(GARBAGE_COLLECTS_SUCCESSFUL).increment(1);
}

/// Updates the shard-count gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_shard_count(count: usize) {
    gauge!(INDEX_SHARDS).set(count as f64);
}
