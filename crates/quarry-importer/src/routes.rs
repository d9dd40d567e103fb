//! HTTP surface of the importer.
//!
//! Upload agents PUT package files one by one; the arrival of the `.dsc`
//! descriptor completes the package and queues it for the worker pool:
//!
//! ```text
//! curl -X PUT --data-binary @i3-wm_4.7.2-1.debian.tar.xz \
//!     http://localhost:21010/import/i3-wm_4.7.2-1/i3-wm_4.7.2-1.debian.tar.xz
//! curl -X PUT --data-binary @i3-wm_4.7.2-1.dsc \
//!     http://localhost:21010/import/i3-wm_4.7.2-1/i3-wm_4.7.2-1.dsc
//! ```
//!
//! The rest of the surface is operator tooling: `POST /merge`,
//! `GET /listpkgs`, `POST /garbagecollect`.

use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::{Form, Json};
use axum::response::IntoResponse;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::{ImporterError, Result};
use crate::importer::DESCRIPTOR_SUFFIX;
use crate::merge;
use crate::server::AppState;
use crate::store;

/// Reply to `GET /listpkgs`.
#[derive(Debug, Serialize)]
pub struct ListPackagesReply {
    /// Every package with a published shard.
    #[serde(rename = "Packages")]
    pub packages: Vec<String>,
}

/// Reply to `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthReply {
    /// Service status.
    pub status: String,
}

/// Parameters of `POST /garbagecollect`, accepted from the query string or
/// the form body.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct GarbageCollectParams {
    package: Option<String>,
}

/// `PUT /import/<pkg>/<file>`: stream one uploaded file into staging.
pub(crate) async fn import_package(
    State(state): State<AppState>,
    Path((pkg, file)): Path<(String, String)>,
    request: Request,
) -> Result<impl IntoResponse> {
    match store_upload(&state, &pkg, &file, request).await {
        Ok(reply) => {
            crate::metrics::record_upload_success();
            Ok(reply)
        }
        Err(e) => {
            crate::metrics::record_upload_failure();
            Err(e)
        }
    }
}

async fn store_upload(
    state: &AppState,
    pkg: &str,
    file: &str,
    request: Request,
) -> Result<String> {
    validate_segment(pkg)?;
    validate_segment(file)?;

    let package_staging = state.importer.staging_path().join(pkg);
    tokio::fs::create_dir_all(&package_staging)
        .await
        .map_err(|e| {
            ImporterError::storage_io(format!("creating {}", package_staging.display()), &e)
        })?;

    let destination = package_staging.join(file);
    let mut output = tokio::fs::File::create(&destination).await.map_err(|e| {
        ImporterError::storage_io(format!("creating {}", destination.display()), &e)
    })?;

    let mut written: u64 = 0;
    let mut body = request.into_body().into_data_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| ImporterError::storage(format!("reading upload: {e}")))?;
        output.write_all(&chunk).await.map_err(|e| {
            ImporterError::storage_io(format!("writing {}", destination.display()), &e)
        })?;
        written += chunk.len() as u64;
    }
    output.flush().await.map_err(|e| {
        ImporterError::storage_io(format!("writing {}", destination.display()), &e)
    })?;

    tracing::info!(pkg, file, bytes = written, "stored upload");

    if file.ends_with(DESCRIPTOR_SUFFIX) {
        state.importer.enqueue(format!("{pkg}/{file}"));
    }

    Ok(format!(
        "thank you for sending file {file} for package {pkg}!\n"
    ))
}

/// A path segment an uploader may pick. Anything that could walk out of
/// the staging directory is refused.
fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
        || segment.contains('\0')
    {
        return Err(ImporterError::invalid_request(format!(
            "invalid path segment {segment:?}"
        )));
    }
    Ok(())
}

/// `POST /merge`: start a merge, or report one is already running.
pub(crate) async fn start_merge(State(state): State<AppState>) -> Result<&'static str> {
    merge::try_start_merge(&state.importer)?;
    Ok("Merge started.")
}

/// `GET /listpkgs`: every package with a published shard.
pub(crate) async fn list_packages(
    State(state): State<AppState>,
) -> Result<Json<ListPackagesReply>> {
    let packages = store::package_names(state.importer.store())?;
    Ok(Json(ListPackagesReply { packages }))
}

/// `POST /garbagecollect`: remove one package's tree and shard.
pub(crate) async fn garbage_collect(
    State(state): State<AppState>,
    Query(query): Query<GarbageCollectParams>,
    form: Option<Form<GarbageCollectParams>>,
) -> Result<StatusCode> {
    let pkg = query
        .package
        .or_else(|| form.and_then(|Form(params)| params.package))
        .filter(|pkg| !pkg.is_empty())
        .ok_or(ImporterError::MissingParameter { name: "package" })?;

    let store_root = state.importer.store().to_path_buf();
    tokio::task::spawn_blocking(move || store::remove_package(&store_root, &pkg))
        .await
        .map_err(|e| ImporterError::storage(format!("garbage collect task failed: {e}")))??;

    crate::metrics::record_garbage_collect_success();
    Ok(StatusCode::OK)
}

/// `GET /health`: shallow liveness check.
pub(crate) async fn health() -> Json<HealthReply> {
    Json(HealthReply {
        status: "ok".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use std::fs;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode, header};
    use tower::ServiceExt;

    use quarry_core::{LogFormat, SystemRunner};
    use quarry_index::TrigramEngine;

    use crate::backend::IndexBackend;
    use crate::config::Config;
    use crate::importer::Importer;
    use crate::server::create_router;

    struct NoBackend;

    #[async_trait::async_trait]
    impl IndexBackend for NoBackend {
        async fn replace_index(&self, _replacement: &str) -> crate::error::Result<()> {
            panic!("no test reaches the backend");
        }
    }

    fn test_importer(store: &std::path::Path) -> Arc<Importer> {
        let config = Config {
            listen_address: "127.0.0.1:0".parse().expect("addr"),
            unpacked_path: store.to_path_buf(),
            index_backend_url: "http://localhost:0".to_string(),
            tls_cert_path: None,
            tls_key_path: None,
            debug_skip: false,
            max_file_size: crate::config::DEFAULT_MAX_FILE_SIZE,
            workers: 1,
            log_format: LogFormat::Pretty,
        };
        Arc::new(
            Importer::new(
                config,
                Arc::new(TrigramEngine),
                Arc::new(SystemRunner),
                Arc::new(NoBackend),
            )
            .expect("build importer"),
        )
    }

    async fn body_string(response: axum::response::Response) -> Result<String> {
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .context("read body")?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    #[tokio::test]
    async fn import_stores_the_file_and_acks() -> Result<()> {
        let store = tempfile::tempdir()?;
        let importer = test_importer(store.path());
        let router = create_router(Arc::clone(&importer));

        let response = router
            .oneshot(
                HttpRequest::builder()
                    .method("PUT")
                    .uri("/import/hello_2.12-1/hello_2.12.orig.tar.gz")
                    .body(Body::from("archive bytes"))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await?;
        assert!(body.contains("hello_2.12.orig.tar.gz"));

        let staged = importer
            .staging_path()
            .join("hello_2.12-1/hello_2.12.orig.tar.gz");
        assert_eq!(fs::read(staged)?, b"archive bytes");
        Ok(())
    }

    #[tokio::test]
    async fn descriptors_are_enqueued_for_the_worker_pool() -> Result<()> {
        let store = tempfile::tempdir()?;
        let importer = test_importer(store.path());
        let mut queue = importer.take_queue_receiver().expect("queue available");
        let router = create_router(Arc::clone(&importer));

        let response = router
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .method("PUT")
                    .uri("/import/hello_2.12-1/hello_2.12-1.dsc")
                    .body(Body::from("Format: 3.0\n"))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(queue.try_recv()?, "hello_2.12-1/hello_2.12-1.dsc");

        // Non-descriptor uploads do not queue anything.
        let response = router
            .oneshot(
                HttpRequest::builder()
                    .method("PUT")
                    .uri("/import/hello_2.12-1/README")
                    .body(Body::from("docs"))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(queue.try_recv().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn traversal_attempts_fail_the_upload() -> Result<()> {
        let store = tempfile::tempdir()?;
        let importer = test_importer(store.path());
        let router = create_router(Arc::clone(&importer));

        let response = router
            .oneshot(
                HttpRequest::builder()
                    .method("PUT")
                    .uri("/import/%2E%2E/escape.dsc")
                    .body(Body::from("nope"))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // Nothing escaped the staging area.
        assert!(!importer.staging_path().join("../escape.dsc").exists());
        Ok(())
    }

    #[tokio::test]
    async fn listpkgs_reports_published_shards_only() -> Result<()> {
        let store = tempfile::tempdir()?;
        let router = create_router(test_importer(store.path()));

        let response = router
            .clone()
            .oneshot(HttpRequest::builder().uri("/listpkgs").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await?, r#"{"Packages":[]}"#);

        fs::write(store.path().join("hello_2.12-1.idx"), b"shard")?;
        fs::write(store.path().join("partial_1.0-1.tmp"), b"in flight")?;
        fs::write(store.path().join("full.idx"), b"merged")?;

        let response = router
            .oneshot(HttpRequest::builder().uri("/listpkgs").body(Body::empty())?)
            .await?;
        assert_eq!(
            body_string(response).await?,
            r#"{"Packages":["hello_2.12-1"]}"#
        );
        Ok(())
    }

    #[tokio::test]
    async fn garbage_collect_requires_a_package_parameter() -> Result<()> {
        let store = tempfile::tempdir()?;
        let router = create_router(test_importer(store.path()));

        let response = router
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/garbagecollect")
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(response).await?.contains("no ?package="));
        Ok(())
    }

    #[tokio::test]
    async fn garbage_collect_rejects_unknown_packages() -> Result<()> {
        let store = tempfile::tempdir()?;
        let router = create_router(test_importer(store.path()));

        let response = router
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/garbagecollect?package=ghost_1.0-1")
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        Ok(())
    }

    #[tokio::test]
    async fn garbage_collect_removes_tree_and_shard() -> Result<()> {
        let store = tempfile::tempdir()?;
        fs::create_dir(store.path().join("hello_2.12-1"))?;
        fs::write(store.path().join("hello_2.12-1/main.c"), b"int main;\n")?;
        fs::write(store.path().join("hello_2.12-1.idx"), b"shard")?;
        let router = create_router(test_importer(store.path()));

        let response = router
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/garbagecollect")
                    .header(
                        header::CONTENT_TYPE,
                        "application/x-www-form-urlencoded",
                    )
                    .body(Body::from("package=hello_2.12-1"))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!store.path().join("hello_2.12-1").exists());
        assert!(!store.path().join("hello_2.12-1.idx").exists());
        Ok(())
    }

    #[tokio::test]
    async fn merge_reports_contention_on_the_gate() -> Result<()> {
        let store = tempfile::tempdir()?;
        let importer = test_importer(store.path());
        let router = create_router(Arc::clone(&importer));

        let held = Arc::clone(importer.merge_gate())
            .try_acquire_owned()
            .expect("gate starts free");

        let response = router
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/merge")
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(response).await?.contains("Merge already in progress"));

        drop(held);
        let response = router
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/merge")
                    .body(Body::empty())?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await?, "Merge started.");
        Ok(())
    }

    #[tokio::test]
    async fn health_answers() -> Result<()> {
        let store = tempfile::tempdir()?;
        let router = create_router(test_importer(store.path()));

        let response = router
            .oneshot(HttpRequest::builder().uri("/health").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await?.contains("ok"));
        Ok(())
    }
}
