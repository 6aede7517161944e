//! Background sweeps.
//!
//! # Responsibilities
//! - Drop idle rate-limit records and lapsed denial counters
//! - Drop expired CSRF tokens
//! - Drop expired admin sessions
//! - Apply audit retention between writes
//!
//! Each sweep goes through the owning store's own locking, so it never races
//! request handling.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;

use crate::admin::session::SessionStore;
use crate::audit::AuditLog;
use crate::config::GateConfig;
use crate::lifecycle::ShutdownSignal;
use crate::security::{CsrfTokenStore, DenialTracker, RateLimiter};

pub struct Housekeeper {
    limiter: Arc<RateLimiter>,
    csrf: Arc<CsrfTokenStore>,
    denials: Arc<DenialTracker>,
    sessions: Arc<SessionStore>,
    audit: AuditLog,
    rate_limit_interval: Duration,
    csrf_interval: Duration,
    session_interval: Duration,
    audit_interval: Duration,
}

impl Housekeeper {
    pub fn new(
        config: &GateConfig,
        limiter: Arc<RateLimiter>,
        csrf: Arc<CsrfTokenStore>,
        denials: Arc<DenialTracker>,
        sessions: Arc<SessionStore>,
        audit: AuditLog,
    ) -> Self {
        Self {
            limiter,
            csrf,
            denials,
            sessions,
            audit,
            rate_limit_interval: Duration::from_secs(config.rate_limit.sweep_interval_secs),
            csrf_interval: Duration::from_secs(config.csrf.sweep_interval_secs),
            session_interval: Duration::from_secs(config.admin.session_sweep_interval_secs),
            audit_interval: Duration::from_secs(config.audit.trim_interval_secs),
        }
    }

    /// Spawn one task per sweep; each exits once shutdown is triggered.
    pub fn spawn(self, shutdown: &ShutdownSignal) -> Vec<JoinHandle<()>> {
        let limiter = self.limiter;
        let denials = self.denials;
        let csrf = self.csrf;
        let sessions = self.sessions;
        let audit = self.audit;

        vec![
            spawn_periodic("rate_limit", self.rate_limit_interval, shutdown.clone(), move || {
                let limiter = limiter.clone();
                let denials = denials.clone();
                async move {
                    let removed = limiter.sweep();
                    let counters = denials.sweep();
                    if removed > 0 || counters > 0 {
                        tracing::debug!(
                            removed,
                            denial_counters = counters,
                            remaining = limiter.len(),
                            "Swept rate-limit records"
                        );
                    }
                }
            }),
            spawn_periodic("csrf", self.csrf_interval, shutdown.clone(), move || {
                let csrf = csrf.clone();
                async move {
                    let removed = csrf.sweep();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = csrf.len(), "Swept expired CSRF tokens");
                    }
                }
            }),
            spawn_periodic("sessions", self.session_interval, shutdown.clone(), move || {
                let sessions = sessions.clone();
                async move {
                    let removed = sessions.sweep();
                    if removed > 0 {
                        tracing::debug!(removed, active = sessions.len(), "Swept expired admin sessions");
                    }
                }
            }),
            spawn_periodic("audit_retention", self.audit_interval, shutdown.clone(), move || {
                let audit = audit.clone();
                async move {
                    match audit.apply_retention().await {
                        Ok(0) => {}
                        Ok(removed) => tracing::info!(removed, "Audit retention trimmed entries"),
                        Err(e) => tracing::error!(error = %e, "Audit retention pass failed"),
                    }
                }
            }),
        ]
    }
}

fn spawn_periodic<F, Fut>(
    name: &'static str,
    interval: Duration,
    mut shutdown: ShutdownSignal,
    task: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        tracing::info!(task = name, interval_secs = interval.as_secs(), "Housekeeping task starting");
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => task().await,
                _ = shutdown.recv() => {
                    tracing::info!(task = name, "Housekeeping task received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    })
}
