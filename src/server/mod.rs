//! JSON HTTP API over the batch orchestrator.
//!
//! A front-end creates a session, posts base64 images to it, flips between
//! the image and JSON views, and downloads the result. The extractor is
//! built once at start-up, so a missing credential stops the server before
//! it binds.

mod handlers;
mod routes;
mod state;

pub use state::AppState;

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::extract::{build_extractor, Extractor};
use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Upload ceiling for one extract request (base64 inflates by a third).
const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Full application router with middleware.
pub fn router(state: AppState) -> Router {
    routes::create_router()
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: &str, config: ExtractionConfig) -> Result<(), ExtractError> {
    let extractor: Arc<dyn Extractor> = Arc::from(build_extractor(&config)?);
    let app = router(AppState::new(config, extractor));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ExtractError::Internal(format!("Failed to bind {addr}: {e}")))?;
    info!("img2json server listening on {addr}");

    axum::serve(listener, app)
        .await
        .map_err(|e| ExtractError::Internal(format!("Server error: {e}")))
}
