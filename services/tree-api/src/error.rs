//! Error responses.

use axum::{
    http::{header, StatusCode},
    response::Response,
};
use serde::Serialize;

use tree_common::DataError;

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

/// Render `err` as `{error, message}` with its HTTP status.
pub fn error_response(err: &DataError, debug: bool) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorBody {
        error: err.kind().as_str(),
        message: err.public_message(debug),
    };
    let json = serde_json::to_string(&body).unwrap_or_default();

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json");
    if status == StatusCode::UNAUTHORIZED {
        builder = builder.header(header::WWW_AUTHENTICATE, "Bearer");
    }
    builder
        .body(json.into())
        .unwrap_or_else(|_| Response::new(axum::body::Body::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_common::{BackendError, NodePath};

    #[test]
    fn test_backend_detail_hidden() {
        let err = DataError::Backend(BackendError::permanent(
            NodePath::parse("a/b"),
            "disk /dev/sdb3 unreadable",
        ));
        let response = error_response(&err, false);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = ErrorBody {
            error: err.kind().as_str(),
            message: err.public_message(false),
        };
        assert_eq!(body.error, "backend_error");
        assert!(!body.message.contains("sdb3"));
        assert!(err.public_message(true).contains("sdb3"));
    }

    #[test]
    fn test_unauthorized_challenge() {
        let response = error_response(&DataError::Unauthorized("no credential".into()), false);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}
