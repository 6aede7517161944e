//! Audit entry types.
//!
//! Entries serialize in camelCase with the event kind under `type`, matching
//! the on-disk audit document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Login,
    Logout,
    Action,
    SecurityAlert,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Login => "login",
            EventKind::Logout => "logout",
            EventKind::Action => "action",
            EventKind::SecurityAlert => "security_alert",
        }
    }
}

/// Ordered so the most severe alert wins with `max()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    MultipleFailedAttempts,
    NewIpAddress,
    UnusualTime,
    BlockedIpAccess,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub message: String,
    pub severity: Severity,
}

impl Alert {
    pub fn new(kind: AlertKind, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            kind,
            message: message.into(),
            severity,
        }
    }
}

/// Who an event came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventOrigin {
    pub ip: String,
    pub user_agent_hash: Option<String>,
    pub session_id: Option<String>,
}

impl EventOrigin {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            ..Self::default()
        }
    }

    /// Only a digest of the user agent is stored.
    pub fn with_user_agent(mut self, user_agent: Option<&str>) -> Self {
        self.user_agent_hash = user_agent.filter(|ua| !ua.is_empty()).map(hash_user_agent);
        self
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }
}

/// First 16 hex chars of the SHA-256 of the user agent.
pub fn hash_user_agent(user_agent: &str) -> String {
    let digest = Sha256::digest(user_agent.as_bytes());
    hex::encode(&digest[..8])
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Login outcome; absent for other kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alerts: Vec<Alert>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_entry: Option<Box<AuditEntry>>,
}

impl AuditEntry {
    fn base(kind: EventKind, timestamp: DateTime<Utc>, origin: EventOrigin) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            kind,
            success: None,
            ip: origin.ip,
            user_agent_hash: origin.user_agent_hash,
            session_id: origin.session_id,
            details: Map::new(),
            alerts: Vec::new(),
            severity: None,
            trigger_entry: None,
        }
    }

    pub fn login(timestamp: DateTime<Utc>, origin: EventOrigin, success: bool) -> Self {
        let mut entry = Self::base(EventKind::Login, timestamp, origin);
        entry.success = Some(success);
        entry
    }

    pub fn logout(timestamp: DateTime<Utc>, origin: EventOrigin) -> Self {
        Self::base(EventKind::Logout, timestamp, origin)
    }

    pub fn action(timestamp: DateTime<Utc>, origin: EventOrigin, action: &str) -> Self {
        Self::base(EventKind::Action, timestamp, origin).with_detail("action", action)
    }

    /// Alert entry; its severity is the highest among `alerts`.
    pub fn security_alert(
        timestamp: DateTime<Utc>,
        ip: impl Into<String>,
        alerts: Vec<Alert>,
        trigger: Option<AuditEntry>,
    ) -> Self {
        let mut entry = Self::base(EventKind::SecurityAlert, timestamp, EventOrigin::new(ip));
        entry.severity = alerts.iter().map(|a| a.severity).max();
        entry.alerts = alerts;
        if let Some(trigger) = trigger {
            entry.user_agent_hash = trigger.user_agent_hash.clone();
            entry.session_id = trigger.session_id.clone();
            entry.trigger_entry = Some(Box::new(trigger));
        }
        entry
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn is_successful_login(&self) -> bool {
        self.kind == EventKind::Login && self.success == Some(true)
    }

    pub fn is_failed_login(&self) -> bool {
        self.kind == EventKind::Login && self.success == Some(false)
    }

    pub fn has_alert(&self, kind: AlertKind) -> bool {
        self.alerts.iter().any(|a| a.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ts() -> DateTime<Utc> {
        "2025-03-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn serializes_with_document_field_names() {
        let origin = EventOrigin::new("203.0.113.5")
            .with_user_agent(Some("curl/8.0"))
            .with_session(Some("s-1".into()));
        let entry = AuditEntry::login(ts(), origin, true);
        let value = serde_json::to_value(&entry).unwrap();

        assert_eq!(value["type"], "login");
        assert_eq!(value["success"], true);
        assert_eq!(value["ip"], "203.0.113.5");
        assert_eq!(value["sessionId"], "s-1");
        assert_eq!(value["userAgentHash"].as_str().unwrap().len(), 16);
        assert!(value.get("alerts").is_none());
        assert!(value.get("triggerEntry").is_none());
    }

    #[test]
    fn alert_entry_takes_highest_severity() {
        let trigger = AuditEntry::login(ts(), EventOrigin::new("198.51.100.2"), true);
        let alert = AuditEntry::security_alert(
            ts(),
            "198.51.100.2",
            vec![
                Alert::new(AlertKind::UnusualTime, "late", Severity::Low),
                Alert::new(AlertKind::NewIpAddress, "new", Severity::Medium),
            ],
            Some(trigger.clone()),
        );

        assert_eq!(alert.kind, EventKind::SecurityAlert);
        assert_eq!(alert.severity, Some(Severity::Medium));
        assert_eq!(alert.trigger_entry.as_deref(), Some(&trigger));

        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["alerts"][1]["type"], "new_ip_address");
        assert_eq!(value["severity"], "medium");
        assert_eq!(value["triggerEntry"]["type"], "login");
    }

    #[test]
    fn deserializes_legacy_entry_without_optional_fields() {
        let entry: AuditEntry = serde_json::from_value(json!({
            "id": "5f0c6a5e-0000-4000-8000-000000000001",
            "timestamp": "2025-03-01T12:00:00Z",
            "type": "logout",
            "ip": "127.0.0.1"
        }))
        .unwrap();
        assert_eq!(entry.kind, EventKind::Logout);
        assert!(entry.details.is_empty());
        assert!(entry.success.is_none());
    }

    #[test]
    fn user_agent_hash_is_stable() {
        assert_eq!(hash_user_agent("Mozilla/5.0"), hash_user_agent("Mozilla/5.0"));
        assert_ne!(hash_user_agent("Mozilla/5.0"), hash_user_agent("curl/8.0"));
        assert!(EventOrigin::new("x").with_user_agent(Some("")).user_agent_hash.is_none());
    }
}
