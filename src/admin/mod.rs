//! Admin control plane.
//!
//! `/admin/csrf-token` and `/admin/login` are reachable by any allow-listed
//! client; everything else also needs a live session.

pub mod auth;
pub mod handlers;
pub mod session;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::require_session;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/admin/logout", post(logout))
        .route("/admin/status", get(get_status))
        .route("/admin/actions", post(record_action))
        .route("/admin/audit", get(get_audit_log))
        .route("/admin/audit/export", get(export_audit_log))
        .route(
            "/admin/allowlist",
            get(get_allowlist).post(add_allowlist_entry).delete(remove_allowlist_entry),
        )
        .route_layer(middleware::from_fn_with_state(state, require_session));

    Router::new()
        .route("/admin/csrf-token", get(issue_csrf_token))
        .route("/admin/login", post(login))
        .merge(protected)
}
