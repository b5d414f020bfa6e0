//! Tree API service library.
//!
//! HTTP binding of the data service: metadata, sliced data and search
//! over the configured node tree, plus health and metrics endpoints.

pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Metadata
        .route("/api/v1/metadata/", get(handlers::metadata::root_metadata_handler))
        .route("/api/v1/metadata/*path", get(handlers::metadata::metadata_handler))
        // Data
        .route("/api/v1/data/*path", get(handlers::data::data_handler))
        // Search
        .route("/api/v1/search/", get(handlers::search::root_search_handler))
        .route("/api/v1/search/*path", get(handlers::search::search_handler))
        // Health and metrics
        .route("/health", get(handlers::health::health_handler))
        .route("/ready", get(handlers::health::ready_handler))
        .route("/metrics", get(handlers::health::metrics_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}
