//! Sliced data endpoint.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
};

use codecs::accepted_formats;
use data_service::DataResponse;
use slicer::SliceSpec;
use tracing::debug;

use tree_common::DataResult;

use crate::error::error_response;
use crate::handlers::{credential, node_path, record};
use crate::state::AppState;

/// Query parameters of a data request. `column` may repeat and `columns`
/// takes a comma separated list; both add to the same selection.
#[derive(Debug, Default, PartialEq)]
pub struct DataParams {
    pub slice: Option<String>,
    pub columns: Vec<String>,
    pub format: Option<String>,
    pub api_key: Option<String>,
}

impl DataParams {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = DataParams::default();
        for (key, value) in pairs {
            match key.as_str() {
                "slice" => params.slice = Some(value),
                "column" => params.columns.push(value.trim().to_string()),
                "columns" => params.columns.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|c| !c.is_empty())
                        .map(str::to_string),
                ),
                "format" => params.format = Some(value),
                "api_key" => params.api_key = Some(value),
                other => debug!(parameter = other, "Ignoring unknown query parameter"),
            }
        }
        params
    }

    pub fn slice_spec(&self) -> DataResult<SliceSpec> {
        let spec = SliceSpec::parse(self.slice.as_deref().unwrap_or(""))?;
        Ok(spec.with_columns(self.columns.clone()))
    }
}

/// GET /api/v1/data/*path
pub async fn data_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(path): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Response {
    let response = match fetch(&state, &path, pairs, &headers).await {
        Ok(data) => data_response(data),
        Err(e) => error_response(&e, state.debug_errors),
    };
    record("data", response)
}

async fn fetch(
    state: &AppState,
    path: &str,
    pairs: Vec<(String, String)>,
    headers: &HeaderMap,
) -> DataResult<DataResponse> {
    let params = DataParams::from_pairs(pairs);
    let credential = credential(headers, params.api_key.as_deref())?;
    // A bad credential outranks a bad slice or format.
    state.service.authenticate(credential.as_ref())?;
    let spec = params.slice_spec()?;
    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
    let formats = accepted_formats(params.format.as_deref(), accept)?;

    state
        .service
        .data(credential.as_ref(), &node_path(Some(path)), spec, &formats)
        .await
}

fn data_response(data: DataResponse) -> Response {
    let version = HeaderValue::from_str(data.content_version.as_str())
        .unwrap_or_else(|_| HeaderValue::from_static("opaque"));
    let cache = if data.cached { "hit" } else { "miss" };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, data.media_type)
        .header(header::ETAG, data.freshness_token)
        .header("X-Content-Version", version)
        .header("X-Cache", cache)
        .body(data.bytes.into())
        .unwrap_or_else(|_| Response::new(axum::body::Body::empty()))
}
