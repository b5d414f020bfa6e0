//! Search endpoint.

use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Extension, Path, Query},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use serde::Deserialize;

use search::{Query as SearchQuery, SearchPage, SearchRequest, DEFAULT_LIMIT};
use tree_common::{DataError, DataResult, NodePath};

use crate::error::error_response;
use crate::handlers::{credential, node_path, record};
use crate::state::AppState;

/// Query parameters for search.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    /// JSON encoded query. Absent matches every node.
    pub filter: Option<String>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    pub path_scoped: Option<bool>,
    pub api_key: Option<String>,
}

impl SearchParams {
    pub fn into_request(self, root: NodePath) -> DataResult<SearchRequest> {
        let query = match self.filter.as_deref().map(str::trim) {
            Some(filter) if !filter.is_empty() => SearchQuery::from_json(filter)?,
            _ => SearchQuery::all(),
        };
        Ok(SearchRequest::new(root, query)
            .path_scoped(self.path_scoped.unwrap_or(false))
            .page(self.offset.unwrap_or(0), self.limit.unwrap_or(DEFAULT_LIMIT)))
    }
}

/// GET /api/v1/search/*path
pub async fn search_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(path): Path<String>,
    params: Result<Query<SearchParams>, QueryRejection>,
    headers: HeaderMap,
) -> Response {
    record("search", respond(&state, Some(&path), params, &headers).await)
}

/// GET /api/v1/search/ (from the root)
pub async fn root_search_handler(
    Extension(state): Extension<Arc<AppState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
    headers: HeaderMap,
) -> Response {
    record("search", respond(&state, None, params, &headers).await)
}

async fn respond(
    state: &AppState,
    path: Option<&str>,
    params: Result<Query<SearchParams>, QueryRejection>,
    headers: &HeaderMap,
) -> Response {
    match run(state, path, params, headers).await {
        Ok(page) => {
            let json = serde_json::to_string(&page).unwrap_or_default();
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/json")
                .body(json.into())
                .unwrap_or_else(|_| Response::new(axum::body::Body::empty()))
        }
        Err(e) => error_response(&e, state.debug_errors),
    }
}

async fn run(
    state: &AppState,
    path: Option<&str>,
    params: Result<Query<SearchParams>, QueryRejection>,
    headers: &HeaderMap,
) -> DataResult<SearchPage> {
    let Query(params) = params.map_err(|e| DataError::Validation(e.body_text()))?;
    let credential = credential(headers, params.api_key.as_deref())?;
    state.service.authenticate(credential.as_ref())?;
    let request = params.into_request(node_path(path))?;
    state.service.search(credential.as_ref(), request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use search::MAX_LIMIT;

    #[test]
    fn test_defaults_match_everything() {
        let request = SearchParams::default().into_request(NodePath::root()).unwrap();
        assert_eq!(request.query, SearchQuery::all());
        assert_eq!(request.limit, DEFAULT_LIMIT);
        assert!(!request.path_scoped);
    }

    #[test]
    fn test_filter_and_window() {
        let params = SearchParams {
            filter: Some(r#"{"type": "eq", "key": "operator", "value": "alice"}"#.into()),
            offset: Some(3),
            limit: Some(5000),
            path_scoped: Some(true),
            api_key: None,
        };
        let request = params.into_request(NodePath::parse("samples")).unwrap();
        assert_eq!(request.query, SearchQuery::eq("operator", "alice"));
        assert_eq!(request.offset, 3);
        assert_eq!(request.limit, MAX_LIMIT);
        assert!(request.path_scoped);
    }

    #[test]
    fn test_malformed_filter() {
        let params = SearchParams {
            filter: Some("{not json".into()),
            ..Default::default()
        };
        let err = params.into_request(NodePath::root()).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
