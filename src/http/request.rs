//! Request metadata helpers.
//!
//! # Responsibilities
//! - Name the request ID header shared by the set/propagate layers
//! - Build the per-request tracing span
//! - Read request metadata the audit trail records

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, Request};
use tracing::Span;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

pub fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok())
}

/// Span carrying the request ID so every log line of the request has it.
pub fn make_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        request_id = %request_id(request.headers()),
        method = %request.method(),
        path = %request.uri().path(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn reads_request_metadata() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id(&headers), "unknown");
        assert_eq!(user_agent(&headers), None);

        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc-123"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.0"));
        assert_eq!(request_id(&headers), "abc-123");
        assert_eq!(user_agent(&headers), Some("curl/8.0"));
    }
}
