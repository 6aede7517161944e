//! Rule-based anomaly detection over recent audit history.
//!
//! # Rules
//! - `multiple_failed_attempts` (high): at least 3 failed logins in the
//!   trailing 60 minutes
//! - `new_ip_address` (medium): the login IP is not among the other
//!   successful logins in the inspected window
//! - `unusual_time` (low): login hour before 06:00 or from 23:00 on
//!
//! Runs only after a successful login, over the newest `window` entries.

use chrono::{DateTime, Duration, FixedOffset, Local, Offset, Timelike, Utc};

use crate::audit::entry::{Alert, AlertKind, AuditEntry, Severity};
use crate::config::AuditConfig;

const FAILED_ATTEMPT_THRESHOLD: usize = 3;
const FAILED_ATTEMPT_LOOKBACK_MINUTES: i64 = 60;
const EARLIEST_NORMAL_HOUR: u32 = 6;
const LATEST_NORMAL_HOUR: u32 = 23;

#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    window: usize,
    offset: FixedOffset,
}

impl AnomalyDetector {
    pub fn new(window: usize, offset: FixedOffset) -> Self {
        Self { window, offset }
    }

    /// Uses the configured offset, or the server's local offset at startup.
    pub fn from_config(config: &AuditConfig) -> Self {
        let offset = config
            .utc_offset_minutes
            .and_then(|minutes| FixedOffset::east_opt(minutes * 60))
            .unwrap_or_else(|| *Local::now().offset());
        Self::new(config.anomaly_window, offset)
    }

    /// `recent` is newest-first and may include `trigger` itself.
    pub fn inspect<'a, I>(&self, recent: I, trigger: &AuditEntry, now: DateTime<Utc>) -> Vec<Alert>
    where
        I: IntoIterator<Item = &'a AuditEntry>,
    {
        if !trigger.is_successful_login() {
            return Vec::new();
        }

        let window: Vec<&AuditEntry> = recent.into_iter().take(self.window).collect();
        let mut alerts = Vec::new();

        let cutoff = now - Duration::minutes(FAILED_ATTEMPT_LOOKBACK_MINUTES);
        let failed = window
            .iter()
            .filter(|e| e.is_failed_login() && e.timestamp >= cutoff)
            .count();
        if failed >= FAILED_ATTEMPT_THRESHOLD {
            alerts.push(Alert::new(
                AlertKind::MultipleFailedAttempts,
                format!("{} failed login attempts in the last hour", failed),
                Severity::High,
            ));
        }

        let known_ip = window
            .iter()
            .filter(|e| e.id != trigger.id && e.is_successful_login())
            .any(|e| e.ip == trigger.ip);
        if !known_ip {
            alerts.push(Alert::new(
                AlertKind::NewIpAddress,
                format!("Login from new IP address: {}", trigger.ip),
                Severity::Medium,
            ));
        }

        let hour = trigger.timestamp.with_timezone(&self.offset).hour();
        if !(EARLIEST_NORMAL_HOUR..LATEST_NORMAL_HOUR).contains(&hour) {
            alerts.push(Alert::new(
                AlertKind::UnusualTime,
                format!("Login at unusual hour: {:02}:00", hour),
                Severity::Low,
            ));
        }

        alerts
    }

    /// Build the alert entry for `trigger`, if any rule fired.
    pub fn evaluate<'a, I>(&self, recent: I, trigger: &AuditEntry, now: DateTime<Utc>) -> Option<AuditEntry>
    where
        I: IntoIterator<Item = &'a AuditEntry>,
    {
        let alerts = self.inspect(recent, trigger, now);
        if alerts.is_empty() {
            return None;
        }
        Some(AuditEntry::security_alert(now, trigger.ip.clone(), alerts, Some(trigger.clone())))
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(20, Utc.fix())
    }
}
