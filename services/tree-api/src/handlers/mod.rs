//! HTTP request handlers.

pub mod data;
pub mod health;
pub mod metadata;
pub mod search;

use axum::{
    http::{header, HeaderMap},
    response::Response,
};
use metrics::counter;

use access_policy::Credential;
use tree_common::{DataError, DataResult, NodePath};

/// Credential from the `Authorization` header or an `api_key` parameter.
pub(crate) fn credential(headers: &HeaderMap, api_key: Option<&str>) -> DataResult<Option<Credential>> {
    let authorization = match headers.get(header::AUTHORIZATION) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| DataError::Unauthorized("malformed Authorization header".to_string()))?,
        ),
        None => None,
    };
    Ok(Credential::from_request(authorization, api_key)?)
}

/// Count a finished request by endpoint and status.
pub(crate) fn record(endpoint: &'static str, response: Response) -> Response {
    let status = response.status().as_u16().to_string();
    counter!("http_requests_total", "endpoint" => endpoint, "status" => status).increment(1);
    response
}

/// Node path from a wildcard capture. A missing capture is the root.
pub(crate) fn node_path(captured: Option<&str>) -> NodePath {
    captured.map(NodePath::parse).unwrap_or_else(NodePath::root)
}
