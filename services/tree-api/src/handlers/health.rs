//! Health, readiness and metrics handlers.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header, StatusCode},
    response::Response,
    Json,
};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub tree: String,
    pub cache_entries: u64,
    pub cache_hit_rate: f64,
}

/// GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /ready - the root adapter answers
pub async fn ready_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    let tree = match state.service.ready().await {
        Ok(()) => "ok".to_string(),
        Err(e) => format!("error: {}", e.public_message(state.debug_errors)),
    };
    let is_ready = tree == "ok";
    let stats = state.service.cache_stats();

    let response = ReadyResponse {
        ready: is_ready,
        tree,
        cache_entries: stats.entries,
        cache_hit_rate: stats.hit_rate(),
    };

    let status = if is_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let json = serde_json::to_string(&response).unwrap_or_default();

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(json.into())
        .unwrap_or_else(|_| Response::new(axum::body::Body::empty()))
}

/// GET /metrics - Prometheus text format
pub async fn metrics_handler(Extension(state): Extension<Arc<AppState>>) -> Response {
    let body = match &state.prometheus {
        Some(handle) => handle.render(),
        None => String::new(),
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(body.into())
        .unwrap_or_else(|_| Response::new(axum::body::Body::empty()))
}
