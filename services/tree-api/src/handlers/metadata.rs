//! Node metadata endpoint.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use serde::Deserialize;

use tree_common::DataResult;

use crate::error::error_response;
use crate::handlers::{credential, node_path, record};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct MetadataParams {
    pub api_key: Option<String>,
}

/// GET /api/v1/metadata/*path
pub async fn metadata_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(path): Path<String>,
    Query(params): Query<MetadataParams>,
    headers: HeaderMap,
) -> Response {
    record("metadata", respond(&state, Some(&path), &params, &headers).await)
}

/// GET /api/v1/metadata/ (the root node)
pub async fn root_metadata_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<MetadataParams>,
    headers: HeaderMap,
) -> Response {
    record("metadata", respond(&state, None, &params, &headers).await)
}

async fn respond(
    state: &AppState,
    path: Option<&str>,
    params: &MetadataParams,
    headers: &HeaderMap,
) -> Response {
    match describe(state, path, params, headers).await {
        Ok(json) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/json")
            .body(json.into())
            .unwrap_or_else(|_| Response::new(axum::body::Body::empty())),
        Err(e) => error_response(&e, state.debug_errors),
    }
}

async fn describe(
    state: &AppState,
    path: Option<&str>,
    params: &MetadataParams,
    headers: &HeaderMap,
) -> DataResult<String> {
    let credential = credential(headers, params.api_key.as_deref())?;
    let summary = state
        .service
        .metadata(credential.as_ref(), &node_path(path))
        .await?;
    Ok(serde_json::to_string(&summary).unwrap_or_default())
}
