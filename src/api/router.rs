//! HTTP router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::config::MAX_UPLOAD_BYTES;
use crate::pipeline::analysis::DocumentAnalyzer;

/// Build the public API router around a shared analyzer.
pub fn api_router(analyzer: Arc<DocumentAnalyzer>) -> Router {
    build_router(ApiContext::new(analyzer))
}

fn build_router(ctx: ApiContext) -> Router {
    Router::new()
        .route("/api/v1/analyze", post(endpoints::analyze::analyze))
        .route("/health", get(endpoints::health::check))
        .route("/info", get(endpoints::info::info))
        .with_state(ctx)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
