//! Request gate middleware.
//!
//! Runs the check chain, buffers the body of mutating requests when the CSRF
//! token is not in the header, and attaches the resolved [`ClientIdentity`]
//! to the request for the handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::security::client_ip::ClientIdentity;
use crate::security::csrf::{requires_token, token_from_body, CSRF_HEADER};
use crate::security::gate::{GateScope, RequestGate};

/// Gate for the admin control plane: allow-list enforced.
pub async fn restricted_gate(
    State(gate): State<Arc<RequestGate>>,
    request: Request,
    next: Next,
) -> Response {
    run_gate(&gate, GateScope::Restricted, request, next).await
}

/// Gate for open endpoints: unlisted clients are throttled.
pub async fn open_gate(
    State(gate): State<Arc<RequestGate>>,
    request: Request,
    next: Next,
) -> Response {
    run_gate(&gate, GateScope::Open, request, next).await
}

async fn run_gate(gate: &RequestGate, scope: GateScope, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let identity = match gate
        .admit(scope, request.method(), request.uri().path(), request.headers(), peer)
        .await
    {
        Ok(identity) => identity,
        Err(e) => return e.into_response(),
    };

    let mut request = request;
    if requires_token(request.method()) {
        let header_token = request
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let token = match header_token {
            Some(token) => Some(token),
            None => {
                let (parts, body) = request.into_parts();
                let bytes = match axum::body::to_bytes(body, gate.max_body_size()).await {
                    Ok(bytes) => bytes,
                    Err(_) => {
                        return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
                    }
                };
                let token = token_from_body(&bytes, gate.csrf_body_field());
                request = Request::from_parts(parts, Body::from(bytes));
                token
            }
        };

        if let Err(e) = gate.verify_csrf(token.as_deref()) {
            return e.into_response();
        }
    }

    request.extensions_mut().insert::<ClientIdentity>(identity);
    next.run(request).await
}
