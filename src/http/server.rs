//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build every shared store once and inject it into the router state
//! - Put the request gate in front of the open API and the admin plane
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Spawn housekeeping and serve until shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin::{self, handlers, session::SessionStore};
use crate::audit::AuditLog;
use crate::clock::{SharedClock, SystemClock};
use crate::config::{AdminConfig, GateConfig};
use crate::http::middleware::{open_gate, restricted_gate};
use crate::http::request::{make_span, X_REQUEST_ID};
use crate::lifecycle::{Housekeeper, ShutdownSignal};
use crate::security::access_control::EntryParseError;
use crate::security::{
    AccessController, AccessPolicy, CsrfTokenStore, DenialTracker, IdentityResolver, RateLimiter, RequestGate,
};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<RequestGate>,
    pub access: Arc<AccessController>,
    pub limiter: Arc<RateLimiter>,
    pub csrf: Arc<CsrfTokenStore>,
    pub denials: Arc<DenialTracker>,
    pub sessions: Arc<SessionStore>,
    pub audit: AuditLog,
    pub clock: SharedClock,
    pub admin: AdminConfig,
}

/// HTTP server for the admin gate.
pub struct HttpServer {
    router: Router,
    state: AppState,
    config: GateConfig,
}

impl HttpServer {
    /// Create a server on the wall clock. Must run inside a Tokio runtime.
    pub fn new(config: GateConfig) -> Result<Self, EntryParseError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: GateConfig, clock: SharedClock) -> Result<Self, EntryParseError> {
        let policy = AccessPolicy::from_entries(&config.access.allowed_ips, config.access.development_mode)?;
        let access = Arc::new(AccessController::new(policy));
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit, clock.clone()));
        let csrf = Arc::new(CsrfTokenStore::new(&config.csrf, clock.clone()));
        let sessions = Arc::new(SessionStore::new(config.admin.session_ttl_secs, clock.clone()));
        let denials = Arc::new(DenialTracker::new(
            config.rate_limit.window_secs,
            config.access.denial_warn_threshold,
            clock.clone(),
        ));
        let audit = AuditLog::open(&config.audit, clock.clone());

        let gate = Arc::new(RequestGate::new(
            IdentityResolver::new(&config.access.trusted_headers),
            access.clone(),
            limiter.clone(),
            csrf.clone(),
            denials.clone(),
            audit.clone(),
            clock.clone(),
            config.csrf.body_field.clone(),
            config.security.max_body_size,
        ));

        let state = AppState {
            gate,
            access,
            limiter,
            csrf,
            denials,
            sessions,
            audit,
            clock,
            admin: config.admin.clone(),
        };

        let router = Self::build_router(&config, state.clone());
        Ok(Self { router, state, config })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Gates are route layers, so unmatched paths fall through to a plain 404
    /// without touching the limiter or the audit log.
    #[allow(deprecated)]
    fn build_router(config: &GateConfig, state: AppState) -> Router {
        let open = Router::new()
            .route("/api/health", get(handlers::health))
            .route("/api/csrf-token", get(handlers::issue_csrf_token))
            .route_layer(middleware::from_fn_with_state(state.gate.clone(), open_gate));

        let restricted = admin::setup_admin_router(state.clone())
            .route_layer(middleware::from_fn_with_state(state.gate.clone(), restricted_gate));

        Router::new()
            .merge(open)
            .merge(restricted)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(make_span))
                    .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                    .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
                    .layer(TimeoutLayer::new(Duration::from_secs(config.security.request_timeout_secs))),
            )
    }

    /// Run the server, accepting connections on the given listener, until
    /// shutdown is triggered.
    pub async fn run(self, listener: TcpListener, mut shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let housekeeping = Housekeeper::new(
            &self.config,
            self.state.limiter.clone(),
            self.state.csrf.clone(),
            self.state.denials.clone(),
            self.state.sessions.clone(),
            self.state.audit.clone(),
        )
        .spawn(&shutdown);

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        for task in housekeeping {
            let _ = task.await;
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}
