//! Append-only audit log with a single writer.
//!
//! # Data Flow
//! ```text
//! AuditLog handle (cloneable, shared by every request)
//!     → bounded mpsc queue
//!     → AuditWriter task (sole owner of the document)
//!         prepend → retention → anomaly detection → atomic file write
//! ```
//!
//! # Design Decisions
//! - Exactly one task mutates the document, so concurrent appends are
//!   serialized without a lock around the read-modify-write
//! - Writes go to a temp file and are renamed into place
//! - Persistence is best-effort: a failed write is logged and reported, the
//!   entry stays in memory and the request carries on
//! - A corrupt or unreadable store is set aside and reinitialized

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::audit::anomaly::AnomalyDetector;
use crate::audit::entry::{AuditEntry, EventKind};
use crate::clock::SharedClock;
use crate::config::AuditConfig;
use crate::error::AuditError;
use crate::observability::metrics;

pub const AUDIT_LOG_VERSION: &str = "1.0";
const AUDIT_LOG_DESCRIPTION: &str = "Admin authentication and action audit log";
const QUEUE_CAPACITY: usize = 1024;

/// On-disk document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditDocument {
    pub audit_log: AuditLogSection,
    pub settings: AuditSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogSection {
    pub created: DateTime<Utc>,
    pub version: String,
    pub description: String,
    /// Newest first.
    pub entries: VecDeque<AuditEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSettings {
    pub max_entries: usize,
    pub alert_on_suspicious_activity: bool,
    pub retention_days: u32,
}

impl From<&AuditConfig> for AuditSettings {
    fn from(config: &AuditConfig) -> Self {
        Self {
            max_entries: config.max_entries,
            alert_on_suspicious_activity: config.alert_on_suspicious_activity,
            retention_days: config.retention_days,
        }
    }
}

impl AuditDocument {
    pub fn empty(created: DateTime<Utc>, settings: AuditSettings) -> Self {
        Self {
            audit_log: AuditLogSection {
                created,
                version: AUDIT_LOG_VERSION.to_string(),
                description: AUDIT_LOG_DESCRIPTION.to_string(),
                entries: VecDeque::new(),
            },
            settings,
        }
    }

    /// Drop expired entries, then cap the length. Returns entries removed.
    pub fn apply_retention(&mut self, now: DateTime<Utc>) -> usize {
        let entries = &mut self.audit_log.entries;
        let before = entries.len();
        let max_age = Duration::days(i64::from(self.settings.retention_days));
        entries.retain(|e| now - e.timestamp <= max_age);
        entries.truncate(self.settings.max_entries);
        before - entries.len()
    }

    pub fn summarize(&self, now: DateTime<Utc>) -> AuditSummary {
        let logins: Vec<&AuditEntry> = self
            .audit_log
            .entries
            .iter()
            .filter(|e| e.kind == EventKind::Login)
            .collect();
        let successful = logins.iter().filter(|e| e.success == Some(true)).count();
        let failed = logins.len() - successful;
        let success_rate = if logins.is_empty() {
            0.0
        } else {
            (successful as f64 / logins.len() as f64 * 1000.0).round() / 10.0
        };
        let day_ago = now - Duration::hours(24);

        AuditSummary {
            total_login_attempts: logins.len(),
            successful_logins: successful,
            failed_logins: failed,
            success_rate,
            unique_ips: logins.iter().map(|e| e.ip.as_str()).collect::<HashSet<_>>().len(),
            last_successful_login: logins
                .iter()
                .find(|e| e.success == Some(true))
                .map(|e| e.timestamp),
            recent_failed_attempts: logins
                .iter()
                .filter(|e| e.success == Some(false) && e.timestamp > day_ago)
                .count(),
        }
    }
}

/// Derived statistics over the whole log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub total_login_attempts: usize,
    pub successful_logins: usize,
    pub failed_logins: usize,
    /// Percentage, one decimal.
    pub success_rate: f64,
    pub unique_ips: usize,
    pub last_successful_login: Option<DateTime<Utc>>,
    /// Failed logins in the trailing 24 hours.
    pub recent_failed_attempts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub entries: Vec<AuditEntry>,
    pub summary: AuditSummary,
}

/// Result of an append that reached the writer.
#[derive(Debug, Clone, Default)]
pub struct AppendOutcome {
    /// Alert raised by anomaly detection, already appended.
    pub alert: Option<AuditEntry>,
}

enum AuditCommand {
    Append {
        entry: AuditEntry,
        reply: oneshot::Sender<Result<AppendOutcome, AuditError>>,
    },
    Query {
        limit: usize,
        reply: oneshot::Sender<AuditReport>,
    },
    Export {
        reply: oneshot::Sender<AuditDocument>,
    },
    ApplyRetention {
        reply: oneshot::Sender<Result<usize, AuditError>>,
    },
}

/// Cloneable handle to the audit writer task.
#[derive(Clone)]
pub struct AuditLog {
    tx: mpsc::Sender<AuditCommand>,
}

impl AuditLog {
    /// Load the store and spawn its writer. Must run inside a Tokio runtime.
    pub fn open(config: &AuditConfig, clock: SharedClock) -> Self {
        let detector = AnomalyDetector::from_config(config);
        Self::open_with_detector(config, detector, clock)
    }

    pub fn open_with_detector(config: &AuditConfig, detector: AnomalyDetector, clock: SharedClock) -> Self {
        let path = PathBuf::from(&config.path);
        let settings = AuditSettings::from(config);
        let document = match load_document(&path) {
            Ok(Some(mut doc)) => {
                doc.settings = settings;
                tracing::info!(
                    path = %path.display(),
                    entries = doc.audit_log.entries.len(),
                    "Loaded audit log"
                );
                doc
            }
            Ok(None) => AuditDocument::empty(clock.now(), settings),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Audit log unreadable, reinitializing");
                preserve_corrupt(&path);
                AuditDocument::empty(clock.now(), settings)
            }
        };

        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let writer = AuditWriter {
            path,
            document,
            detector,
            clock,
            rx,
        };
        tokio::spawn(writer.run());

        Self { tx }
    }

    /// Append an entry; returns once the writer has processed it.
    pub async fn append(&self, entry: AuditEntry) -> Result<AppendOutcome, AuditError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AuditCommand::Append { entry, reply })
            .await
            .map_err(|_| AuditError::WriterUnavailable)?;
        rx.await.map_err(|_| AuditError::WriterUnavailable)?
    }

    /// Best-effort append for the request path. Failures are logged only.
    pub async fn record(&self, entry: AuditEntry) -> Option<AuditEntry> {
        let kind = entry.kind;
        match self.append(entry).await {
            Ok(outcome) => outcome.alert,
            Err(e) => {
                tracing::error!(kind = kind.as_str(), error = %e, "Audit entry not persisted");
                None
            }
        }
    }

    /// Newest `limit` entries plus summary statistics.
    pub async fn query(&self, limit: usize) -> Result<AuditReport, AuditError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AuditCommand::Query { limit, reply })
            .await
            .map_err(|_| AuditError::WriterUnavailable)?;
        rx.await.map_err(|_| AuditError::WriterUnavailable)
    }

    pub async fn export(&self) -> Result<AuditDocument, AuditError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AuditCommand::Export { reply })
            .await
            .map_err(|_| AuditError::WriterUnavailable)?;
        rx.await.map_err(|_| AuditError::WriterUnavailable)
    }

    /// Run retention outside of an append (housekeeping).
    pub async fn apply_retention(&self) -> Result<usize, AuditError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AuditCommand::ApplyRetention { reply })
            .await
            .map_err(|_| AuditError::WriterUnavailable)?;
        rx.await.map_err(|_| AuditError::WriterUnavailable)?
    }
}

struct AuditWriter {
    path: PathBuf,
    document: AuditDocument,
    detector: AnomalyDetector,
    clock: SharedClock,
    rx: mpsc::Receiver<AuditCommand>,
}

impl AuditWriter {
    async fn run(mut self) {
        tracing::debug!(path = %self.path.display(), "Audit writer started");
        while let Some(command) = self.rx.recv().await {
            match command {
                AuditCommand::Append { entry, reply } => {
                    let result = self.append(entry).await;
                    let _ = reply.send(result);
                }
                AuditCommand::Query { limit, reply } => {
                    let report = AuditReport {
                        entries: self.document.audit_log.entries.iter().take(limit).cloned().collect(),
                        summary: self.document.summarize(self.clock.now()),
                    };
                    let _ = reply.send(report);
                }
                AuditCommand::Export { reply } => {
                    let _ = reply.send(self.document.clone());
                }
                AuditCommand::ApplyRetention { reply } => {
                    let removed = self.document.apply_retention(self.clock.now());
                    let result = if removed > 0 {
                        self.persist().await.map(|_| removed)
                    } else {
                        Ok(0)
                    };
                    let _ = reply.send(result);
                }
            }
        }
        tracing::debug!("Audit writer stopped");
    }

    async fn append(&mut self, entry: AuditEntry) -> Result<AppendOutcome, AuditError> {
        let now = self.clock.now();
        metrics::record_audit_event(entry.kind.as_str());

        let inspect = entry.is_successful_login() && self.document.settings.alert_on_suspicious_activity;
        self.document.audit_log.entries.push_front(entry.clone());
        self.document.apply_retention(now);

        let mut outcome = AppendOutcome::default();
        if inspect {
            if let Some(alert) = self
                .detector
                .evaluate(&self.document.audit_log.entries, &entry, now)
            {
                if let Some(severity) = alert.severity {
                    metrics::record_security_alert(severity.as_str());
                }
                tracing::warn!(
                    ip = %alert.ip,
                    severity = ?alert.severity,
                    alerts = ?alert.alerts.iter().map(|a| a.kind).collect::<Vec<_>>(),
                    "Suspicious login activity detected"
                );
                self.document.audit_log.entries.push_front(alert.clone());
                self.document.apply_retention(now);
                outcome.alert = Some(alert);
            }
        }

        self.persist().await?;
        Ok(outcome)
    }

    async fn persist(&self) -> Result<(), AuditError> {
        write_document(&self.path, &self.document).await.map_err(|e| {
            metrics::record_audit_write_failure();
            tracing::error!(path = %self.path.display(), error = %e, "Failed to write audit log");
            e
        })
    }
}

/// `Ok(None)` when no store exists yet.
fn load_document(path: &Path) -> Result<Option<AuditDocument>, AuditError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AuditError::LogStoreCorrupt(e.to_string())),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| AuditError::LogStoreCorrupt(e.to_string()))
}

fn preserve_corrupt(path: &Path) {
    let mut backup = path.as_os_str().to_owned();
    backup.push(".corrupt");
    if let Err(e) = std::fs::copy(path, &backup) {
        tracing::warn!(error = %e, "Could not preserve corrupt audit log");
    }
}

/// Temp file + rename.
async fn write_document(path: &Path, document: &AuditDocument) -> Result<(), AuditError> {
    let json = serde_json::to_vec_pretty(document).map_err(|e| AuditError::LogWriteFailed(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AuditError::LogWriteFailed(format!("create dir: {}", e)))?;
    }

    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    tokio::fs::write(&temp, &json)
        .await
        .map_err(|e| AuditError::LogWriteFailed(format!("write temp file: {}", e)))?;
    tokio::fs::rename(&temp, path)
        .await
        .map_err(|e| AuditError::LogWriteFailed(format!("rename: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::entry::{AlertKind, EventOrigin, Severity};
    use crate::clock::{Clock, MockClock};
    use chrono::FixedOffset;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn config(dir: &TempDir, max_entries: usize) -> AuditConfig {
        AuditConfig {
            path: dir.path().join("audit.json").to_string_lossy().into_owned(),
            max_entries,
            utc_offset_minutes: Some(0),
            ..AuditConfig::default()
        }
    }

    fn open(config: &AuditConfig) -> (AuditLog, MockClock) {
        let clock = MockClock::from_rfc3339("2025-03-01T12:00:00Z").unwrap();
        let detector = AnomalyDetector::new(config.anomaly_window, FixedOffset::east_opt(0).unwrap());
        (AuditLog::open_with_detector(config, detector, Arc::new(clock.clone())), clock)
    }

    fn action(clock: &MockClock, n: usize) -> AuditEntry {
        AuditEntry::action(
            clock.now(),
            EventOrigin::new("203.0.113.5")
                .with_user_agent(Some("test-agent"))
                .with_session(Some("session-1".into())),
            "update_portfolio",
        )
        .with_detail("seq", n)
    }

    #[tokio::test]
    async fn round_trip_preserves_entries_newest_first() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, 100);
        let (log, clock) = open(&config);

        let mut appended = Vec::new();
        for n in 0..5 {
            let entry = action(&clock, n);
            appended.push(entry.clone());
            log.append(entry).await.unwrap();
            clock.advance(Duration::seconds(1));
        }

        let report = log.query(10).await.unwrap();
        appended.reverse();
        assert_eq!(report.entries, appended);

        let on_disk = load_document(Path::new(&config.path)).unwrap().unwrap();
        assert_eq!(Vec::from(on_disk.audit_log.entries), appended);
        assert_eq!(on_disk.settings.max_entries, 100);
    }

    #[tokio::test]
    async fn query_limit_returns_most_recent() {
        let dir = TempDir::new().unwrap();
        let (log, clock) = open(&config(&dir, 100));
        for n in 0..5 {
            log.append(action(&clock, n)).await.unwrap();
        }
        let report = log.query(2).await.unwrap();
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].details["seq"], 4);
        assert_eq!(report.entries[1].details["seq"], 3);
    }

    #[tokio::test]
    async fn full_log_drops_exactly_the_oldest() {
        let dir = TempDir::new().unwrap();
        let (log, clock) = open(&config(&dir, 3));
        for n in 0..3 {
            log.append(action(&clock, n)).await.unwrap();
        }
        log.append(action(&clock, 3)).await.unwrap();
        log.append(action(&clock, 4)).await.unwrap();

        let seqs: Vec<_> = log
            .query(10)
            .await
            .unwrap()
            .entries
            .iter()
            .map(|e| e.details["seq"].as_u64().unwrap())
            .collect();
        assert_eq!(seqs, vec![4, 3, 2]);
    }

    #[tokio::test]
    async fn expired_entries_are_trimmed_on_write() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, 100);
        config.retention_days = 7;
        let (log, clock) = open(&config);

        log.append(action(&clock, 0)).await.unwrap();
        clock.advance(Duration::days(8));
        log.append(action(&clock, 1)).await.unwrap();

        let report = log.query(10).await.unwrap();
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].details["seq"], 1);
    }

    #[tokio::test]
    async fn background_retention_trims_without_append() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, 100);
        config.retention_days = 1;
        let (log, clock) = open(&config);

        log.append(action(&clock, 0)).await.unwrap();
        clock.advance(Duration::days(2));
        assert_eq!(log.apply_retention().await.unwrap(), 1);
        assert!(log.query(10).await.unwrap().entries.is_empty());
    }

    #[tokio::test]
    async fn successful_login_after_failures_raises_alert() {
        let dir = TempDir::new().unwrap();
        let (log, clock) = open(&config(&dir, 100));

        for _ in 0..3 {
            log.append(AuditEntry::login(clock.now(), EventOrigin::new("203.0.113.5"), false))
                .await
                .unwrap();
            clock.advance(Duration::minutes(1));
        }
        let outcome = log
            .append(AuditEntry::login(clock.now(), EventOrigin::new("198.51.100.9"), true))
            .await
            .unwrap();

        let alert = outcome.alert.expect("alert raised");
        assert!(alert.has_alert(AlertKind::MultipleFailedAttempts));
        assert!(alert.has_alert(AlertKind::NewIpAddress));
        assert_eq!(alert.severity, Some(Severity::High));

        let report = log.query(10).await.unwrap();
        assert_eq!(report.entries.len(), 5);
        assert_eq!(report.entries[0].kind, EventKind::SecurityAlert);
        assert_eq!(report.entries[1].kind, EventKind::Login);
    }

    #[tokio::test]
    async fn detection_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, 100);
        config.alert_on_suspicious_activity = false;
        let (log, clock) = open(&config);

        let outcome = log
            .append(AuditEntry::login(clock.now(), EventOrigin::new("198.51.100.9"), true))
            .await
            .unwrap();
        assert!(outcome.alert.is_none());
    }

    #[tokio::test]
    async fn summary_reports_login_statistics() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, 100);
        config.alert_on_suspicious_activity = false;
        let (log, clock) = open(&config);

        log.append(AuditEntry::login(clock.now(), EventOrigin::new("203.0.113.5"), false))
            .await
            .unwrap();
        clock.advance(Duration::hours(30));
        let last_success = clock.now();
        log.append(AuditEntry::login(last_success, EventOrigin::new("198.51.100.9"), true))
            .await
            .unwrap();
        log.append(AuditEntry::login(clock.now(), EventOrigin::new("198.51.100.9"), false))
            .await
            .unwrap();
        log.append(action(&clock, 0)).await.unwrap();

        let summary = log.query(1).await.unwrap().summary;
        assert_eq!(summary.total_login_attempts, 3);
        assert_eq!(summary.successful_logins, 1);
        assert_eq!(summary.failed_logins, 2);
        assert_eq!(summary.success_rate, 33.3);
        assert_eq!(summary.unique_ips, 2);
        assert_eq!(summary.last_successful_login, Some(last_success));
        assert_eq!(summary.recent_failed_attempts, 1);
    }

    #[tokio::test]
    async fn corrupt_store_is_preserved_and_reinitialized() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, 100);
        std::fs::write(&config.path, "{ not json").unwrap();

        let (log, clock) = open(&config);
        assert!(log.query(10).await.unwrap().entries.is_empty());
        log.append(action(&clock, 0)).await.unwrap();

        let backup = format!("{}.corrupt", config.path);
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "{ not json");
        let doc = load_document(Path::new(&config.path)).unwrap().unwrap();
        assert_eq!(doc.audit_log.entries.len(), 1);
        assert_eq!(doc.audit_log.version, AUDIT_LOG_VERSION);
    }

    #[tokio::test]
    async fn existing_store_is_reloaded() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, 100);
        {
            let (log, clock) = open(&config);
            log.append(action(&clock, 7)).await.unwrap();
        }
        let (log, _clock) = open(&config);
        let report = log.query(10).await.unwrap();
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].details["seq"], 7);
    }

    #[tokio::test]
    async fn write_failure_does_not_lose_entry_in_memory() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let mut config = config(&dir, 100);
        config.path = blocker.join("audit.json").to_string_lossy().into_owned();

        let (log, clock) = open(&config);
        let result = log.append(action(&clock, 0)).await;
        assert!(matches!(result, Err(AuditError::LogWriteFailed(_))));
        assert!(log.record(action(&clock, 1)).await.is_none());
        assert_eq!(log.query(10).await.unwrap().entries.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_appends_are_all_kept() {
        let dir = TempDir::new().unwrap();
        let (log, clock) = open(&config(&dir, 1000));

        let tasks: Vec<_> = (0..50)
            .map(|n| {
                let log = log.clone();
                let entry = action(&clock, n);
                tokio::spawn(async move { log.append(entry).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let doc = log.export().await.unwrap();
        assert_eq!(doc.audit_log.entries.len(), 50);
        let on_disk = load_document(Path::new(&config(&dir, 1000).path)).unwrap().unwrap();
        assert_eq!(on_disk.audit_log.entries.len(), 50);
    }
}
