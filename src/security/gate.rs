//! Request gate: the pre-request check chain.
//!
//! ```text
//! resolve identity → access policy → rate limiter → CSRF (mutating only)
//!       │                 │ deny            │ deny          │ deny
//!       ▼                 ▼                 ▼               ▼
//!   ClientIdentity   403 + alert          429             403
//! ```
//!
//! Restricted scopes (the admin control plane) reject anything the access
//! policy denies. Open scopes let unlisted clients through but throttle them;
//! allow-listed clients are never throttled in either scope.
//!
//! Every restricted denial is audited. A single source that keeps getting
//! denied fills the audit log with alerts, so repeat offenders are counted and
//! reported once per window.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderMap, Method};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::audit::{Alert, AlertKind, AuditEntry, AuditLog, Severity};
use crate::clock::{saturating_secs, SharedClock};
use crate::error::GateError;
use crate::observability::metrics;
use crate::security::access_control::AccessController;
use crate::security::client_ip::{ClientIdentity, IdentityResolver};
use crate::security::csrf::CsrfTokenStore;
use crate::security::rate_limit::{RateDecision, RateLimiter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateScope {
    /// Allow-list enforced.
    Restricted,
    /// Rate limited for clients outside the allow-list.
    Open,
}

/// Per-source count of restricted denials within a window.
pub struct DenialTracker {
    counts: DashMap<String, (DateTime<Utc>, u32)>,
    window: Duration,
    threshold: u32,
    clock: SharedClock,
}

impl DenialTracker {
    pub fn new(window_secs: u64, threshold: u32, clock: SharedClock) -> Self {
        Self {
            counts: DashMap::new(),
            window: saturating_secs(window_secs),
            threshold,
            clock,
        }
    }

    /// Count one denial. Returns true exactly once per window, on the denial
    /// that reaches the threshold.
    pub fn record(&self, ip: &str) -> bool {
        let now = self.clock.now();
        let mut entry = self.counts.entry(ip.to_string()).or_insert((now, 0));
        let (started, count) = entry.value_mut();
        if now - *started > self.window {
            *started = now;
            *count = 0;
        }
        *count = count.saturating_add(1);
        *count == self.threshold
    }

    /// Drop counters whose window has lapsed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.counts.len();
        self.counts.retain(|_, (started, _)| now - *started <= self.window);
        before.saturating_sub(self.counts.len())
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

pub struct RequestGate {
    resolver: IdentityResolver,
    access: Arc<AccessController>,
    limiter: Arc<RateLimiter>,
    csrf: Arc<CsrfTokenStore>,
    denials: Arc<DenialTracker>,
    audit: AuditLog,
    clock: SharedClock,
    csrf_body_field: String,
    max_body_size: usize,
}

impl RequestGate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resolver: IdentityResolver,
        access: Arc<AccessController>,
        limiter: Arc<RateLimiter>,
        csrf: Arc<CsrfTokenStore>,
        denials: Arc<DenialTracker>,
        audit: AuditLog,
        clock: SharedClock,
        csrf_body_field: String,
        max_body_size: usize,
    ) -> Self {
        Self {
            resolver,
            access,
            limiter,
            csrf,
            denials,
            audit,
            clock,
            csrf_body_field,
            max_body_size,
        }
    }

    pub fn csrf_body_field(&self) -> &str {
        &self.csrf_body_field
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Identity, policy and rate checks.
    pub async fn admit(
        &self,
        scope: GateScope,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
        peer: Option<SocketAddr>,
    ) -> Result<ClientIdentity, GateError> {
        metrics::record_gate_request();
        let identity = self.resolver.resolve(headers, peer);
        let allowed = self.access.is_allowed(&identity);

        if scope == GateScope::Restricted && !allowed {
            let err = if identity.is_unknown() {
                GateError::IdentityUnresolved
            } else {
                GateError::PolicyDenied {
                    ip: identity.ip.clone(),
                }
            };
            tracing::warn!(
                client_ip = %identity.ip,
                candidates = ?identity.raw_candidates,
                method = %method,
                path = %path,
                "Blocked admin access from non-allow-listed client"
            );
            if !identity.is_unknown() && self.denials.record(&identity.ip) {
                tracing::warn!(
                    client_ip = %identity.ip,
                    window_secs = self.denials.window.num_seconds(),
                    threshold = self.denials.threshold,
                    "Repeated admin denials from one client; its alerts may evict older audit entries"
                );
            }
            self.record_blocked(&identity, method, path).await;
            metrics::record_gate_rejection(err.reason());
            return Err(err);
        }

        if !allowed {
            if let RateDecision::Blocked { retry_after_secs } = self.limiter.check_and_record(&identity.ip) {
                tracing::warn!(client_ip = %identity.ip, path = %path, retry_after_secs, "Rate limit exceeded");
                let err = GateError::RateLimitExceeded {
                    ip: identity.ip.clone(),
                    retry_after_secs,
                };
                metrics::record_gate_rejection(err.reason());
                return Err(err);
            }
        }

        Ok(identity)
    }

    /// Consume the presented token. Which way it failed is not reported.
    pub fn verify_csrf(&self, token: Option<&str>) -> Result<(), GateError> {
        match token {
            Some(token) if self.csrf.validate_and_consume(token) => Ok(()),
            _ => {
                tracing::warn!(presented = token.is_some(), "CSRF validation failed");
                metrics::record_gate_rejection(GateError::CsrfTokenInvalid.reason());
                Err(GateError::CsrfTokenInvalid)
            }
        }
    }

    async fn record_blocked(&self, identity: &ClientIdentity, method: &Method, path: &str) {
        let alert = Alert::new(
            AlertKind::BlockedIpAccess,
            format!("Admin access attempt from non-allow-listed IP: {}", identity.ip),
            Severity::High,
        );
        let entry = AuditEntry::security_alert(self.clock.now(), identity.ip.clone(), vec![alert], None)
            .with_detail("method", method.as_str())
            .with_detail("path", path);
        metrics::record_security_alert(Severity::High.as_str());
        self.audit.record(entry).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AnomalyDetector, EventKind};
    use crate::clock::MockClock;
    use crate::config::{AuditConfig, CsrfConfig, RateLimitConfig};
    use crate::security::access_control::AccessPolicy;
    use axum::http::HeaderValue;
    use tempfile::TempDir;

    struct Fixture {
        gate: RequestGate,
        audit: AuditLog,
        csrf: Arc<CsrfTokenStore>,
        denials: Arc<DenialTracker>,
        _dir: TempDir,
    }

    fn fixture(allow: &[&str], max_requests: u32) -> Fixture {
        fixture_with_threshold(allow, max_requests, 100)
    }

    fn fixture_with_threshold(allow: &[&str], max_requests: u32, denial_threshold: u32) -> Fixture {
        let dir = TempDir::new().unwrap();
        let clock: SharedClock = Arc::new(MockClock::from_rfc3339("2025-03-01T12:00:00Z").unwrap());
        let audit_config = AuditConfig {
            path: dir.path().join("audit.json").to_string_lossy().into_owned(),
            ..AuditConfig::default()
        };
        let audit = AuditLog::open_with_detector(&audit_config, AnomalyDetector::default(), clock.clone());
        let csrf = Arc::new(CsrfTokenStore::new(&CsrfConfig::default(), clock.clone()));
        let limiter = Arc::new(RateLimiter::new(
            &RateLimitConfig {
                max_requests,
                window_secs: 60,
                block_secs: 60,
                sweep_interval_secs: 60,
            },
            clock.clone(),
        ));
        let denials = Arc::new(DenialTracker::new(60, denial_threshold, clock.clone()));
        let gate = RequestGate::new(
            IdentityResolver::new(&["x-forwarded-for"]),
            Arc::new(AccessController::new(AccessPolicy::from_entries(allow, false).unwrap())),
            limiter,
            csrf.clone(),
            denials.clone(),
            audit.clone(),
            clock,
            "_csrf".to_string(),
            1024,
        );
        Fixture {
            gate,
            audit,
            csrf,
            denials,
            _dir: dir,
        }
    }

    fn from(ip: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(ip));
        headers
    }

    #[tokio::test]
    async fn denied_client_gets_one_blocked_ip_alert() {
        let f = fixture(&["198.51.100.0/24"], 5);
        let err = f
            .gate
            .admit(GateScope::Restricted, &Method::GET, "/admin/status", &from("203.0.113.5"), None)
            .await
            .unwrap_err();
        assert_eq!(err, GateError::PolicyDenied { ip: "203.0.113.5".into() });

        let entries = f.audit.query(10).await.unwrap().entries;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EventKind::SecurityAlert);
        assert!(entries[0].has_alert(AlertKind::BlockedIpAccess));
        assert_eq!(entries[0].severity, Some(Severity::High));
        assert_eq!(entries[0].details["path"], "/admin/status");
    }

    #[tokio::test]
    async fn unresolved_identity_is_rejected() {
        let f = fixture(&["0.0.0.0/0"], 5);
        let err = f
            .gate
            .admit(GateScope::Restricted, &Method::GET, "/admin", &HeaderMap::new(), None)
            .await
            .unwrap_err();
        assert_eq!(err, GateError::IdentityUnresolved);
        assert_eq!(f.audit.query(10).await.unwrap().entries.len(), 1);
    }

    #[tokio::test]
    async fn allow_listed_clients_are_never_throttled() {
        let f = fixture(&["198.51.100.0/24"], 1);
        for _ in 0..10 {
            let id = f
                .gate
                .admit(GateScope::Open, &Method::GET, "/api/health", &from("198.51.100.7"), None)
                .await
                .unwrap();
            assert_eq!(id.ip, "198.51.100.7");
        }
    }

    #[tokio::test]
    async fn open_scope_throttles_unlisted_clients() {
        let f = fixture(&["198.51.100.0/24"], 2);
        for _ in 0..2 {
            f.gate
                .admit(GateScope::Open, &Method::GET, "/api/health", &from("203.0.113.5"), None)
                .await
                .unwrap();
        }
        let err = f
            .gate
            .admit(GateScope::Open, &Method::GET, "/api/health", &from("203.0.113.5"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::RateLimitExceeded { retry_after_secs: 60, .. }));
        assert!(f.audit.query(10).await.unwrap().entries.is_empty());
    }

    #[tokio::test]
    async fn csrf_token_is_consumed_once() {
        let f = fixture(&["198.51.100.0/24"], 5);
        let token = f.csrf.issue();
        assert!(f.gate.verify_csrf(Some(&token)).is_ok());
        assert_eq!(f.gate.verify_csrf(Some(&token)), Err(GateError::CsrfTokenInvalid));
        assert_eq!(f.gate.verify_csrf(None), Err(GateError::CsrfTokenInvalid));
    }

    #[tokio::test]
    async fn repeated_denials_keep_every_alert_and_trip_the_tracker_once() {
        let f = fixture_with_threshold(&["198.51.100.0/24"], 5, 3);
        for _ in 0..5 {
            f.gate
                .admit(GateScope::Restricted, &Method::GET, "/admin/status", &from("203.0.113.5"), None)
                .await
                .unwrap_err();
        }

        let entries = f.audit.query(10).await.unwrap().entries;
        assert_eq!(entries.len(), 5);
        assert!(entries.iter().all(|e| e.has_alert(AlertKind::BlockedIpAccess)));
        assert_eq!(f.denials.len(), 1);
    }

    #[test]
    fn denial_tracker_reports_once_per_window() {
        let mock = MockClock::from_rfc3339("2025-03-01T12:00:00Z").unwrap();
        let tracker = DenialTracker::new(60, 3, Arc::new(mock.clone()));

        let tripped: Vec<bool> = (0..5).map(|_| tracker.record("203.0.113.5")).collect();
        assert_eq!(tripped, [false, false, true, false, false]);
        assert!(!tracker.record("198.51.100.9"));

        mock.advance(Duration::seconds(61));
        assert_eq!(tracker.sweep(), 2);
        assert!(tracker.is_empty());

        let tripped: Vec<bool> = (0..3).map(|_| tracker.record("203.0.113.5")).collect();
        assert_eq!(tripped, [false, false, true]);
    }
}
