//! HTTP server wiring.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

use crate::error::{ImporterError, Result};
use crate::importer::Importer;
use crate::routes;

/// Shared state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The pipeline state injected into every handler.
    pub(crate) importer: Arc<Importer>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("importer", &self.importer)
            .finish()
    }
}

/// Builds the router with all routes and middleware.
///
/// Integration tests drive this router directly with `tower::ServiceExt`
/// instead of binding a port.
#[must_use]
pub fn create_router(importer: Arc<Importer>) -> Router {
    let state = AppState { importer };

    Router::new()
        .route("/import/:pkg/:file", put(routes::import_package))
        .route("/merge", post(routes::start_merge))
        .route("/listpkgs", get(routes::list_packages))
        .route("/garbagecollect", post(routes::garbage_collect))
        .route("/health", get(routes::health))
        .route("/metrics", get(crate::metrics::serve_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the configured listen address and serves until shutdown.
///
/// # Errors
///
/// Fails if the address cannot be bound or the server errors out.
pub async fn serve(importer: Arc<Importer>) -> Result<()> {
    let addr = importer.config().listen_address;
    let router = create_router(importer);

    tracing::info!(%addr, "starting importer HTTP server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ImporterError::storage(format!("failed to bind {addr}: {e}")))?;

    axum::serve(listener, router)
        .await
        .map_err(|e| ImporterError::storage(format!("server error: {e}")))
}
