//! Error types for the admin gate.
//!
//! Rejections from the check chain render as a generic message plus a
//! machine-readable code. They never say which internal check tripped beyond
//! that code (an expired CSRF token and an unknown one look identical).

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Pre-request check failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// No header or peer address produced a usable IP.
    #[error("client identity could not be resolved")]
    IdentityUnresolved,

    #[error("client {ip} is not on the allow-list")]
    PolicyDenied { ip: String },

    #[error("rate limit exceeded for {ip}")]
    RateLimitExceeded { ip: String, retry_after_secs: u64 },

    /// Missing, expired, or already consumed.
    #[error("CSRF token missing or invalid")]
    CsrfTokenInvalid,
}

impl GateError {
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::IdentityUnresolved | GateError::PolicyDenied { .. } => StatusCode::FORBIDDEN,
            GateError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GateError::CsrfTokenInvalid => StatusCode::FORBIDDEN,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GateError::IdentityUnresolved | GateError::PolicyDenied { .. } => "IP_NOT_WHITELISTED",
            GateError::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            GateError::CsrfTokenInvalid => "CSRF_TOKEN_INVALID",
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            GateError::IdentityUnresolved | GateError::PolicyDenied { .. } => "Access denied",
            GateError::RateLimitExceeded { .. } => "Too many requests, please try again later",
            GateError::CsrfTokenInvalid => "Invalid or missing CSRF token",
        }
    }

    /// Metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            GateError::IdentityUnresolved => "identity_unresolved",
            GateError::PolicyDenied { .. } => "policy_denied",
            GateError::RateLimitExceeded { .. } => "rate_limited",
            GateError::CsrfTokenInvalid => "csrf_invalid",
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.public_message(),
            "code": self.code(),
        }));
        let mut response = (self.status(), body).into_response();
        if let GateError::RateLimitExceeded { retry_after_secs, .. } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

/// Audit persistence failures. Logged and swallowed on the request path.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log write failed: {0}")]
    LogWriteFailed(String),

    #[error("audit log store is corrupt: {0}")]
    LogStoreCorrupt(String),

    #[error("audit writer is not running")]
    WriterUnavailable,
}

/// Admin authentication failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("missing or expired session")]
    MissingSession,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let code = match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::MissingSession => "UNAUTHORIZED",
        };
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Authentication required", "code": code })),
        )
            .into_response()
    }
}

/// Failures of the admin API handlers.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        match self {
            AdminError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": message, "code": "BAD_REQUEST" })),
            )
                .into_response(),
            AdminError::Audit(e) => {
                tracing::error!(error = %e, "Audit log unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": "Audit log unavailable", "code": "AUDIT_UNAVAILABLE" })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_and_policy_share_external_code() {
        assert_eq!(GateError::IdentityUnresolved.code(), "IP_NOT_WHITELISTED");
        assert_eq!(
            GateError::PolicyDenied { ip: "203.0.113.5".into() }.code(),
            "IP_NOT_WHITELISTED"
        );
    }

    #[test]
    fn rate_limit_response_sets_retry_after() {
        let response = GateError::RateLimitExceeded {
            ip: "203.0.113.5".into(),
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn csrf_rejection_is_forbidden() {
        let response = GateError::CsrfTokenInvalid.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn admin_errors_map_to_status() {
        let bad = AdminError::BadRequest("invalid allow-list entry".into()).into_response();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let unavailable = AdminError::from(AuditError::WriterUnavailable).into_response();
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
