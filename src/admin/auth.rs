//! Bearer-session authentication for the protected admin routes.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::error::AuthError;
use crate::http::server::AppState;

/// Session token of the authenticated admin, attached by [`require_session`].
#[derive(Debug, Clone)]
pub struct AdminSession(pub String);

pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingSession)?;

    if !state.sessions.is_valid(token) {
        tracing::debug!("Rejected admin request with unknown or expired session");
        return Err(AuthError::MissingSession);
    }

    let session = AdminSession(token.to_string());
    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}
