//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the admin
//! gate. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Placeholder password shipped in the defaults.
pub const DEFAULT_ADMIN_PASSWORD: &str = "CHANGE_ME_IN_PRODUCTION";

/// Root configuration for the admin control plane.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GateConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// IP allow-list and identity resolution.
    pub access: AccessConfig,

    /// Per-client request throttling.
    pub rate_limit: RateLimitConfig,

    /// CSRF token lifetime and sweeping.
    pub csrf: CsrfConfig,

    /// Audit log persistence and anomaly detection.
    pub audit: AuditConfig,

    /// Admin credentials and sessions.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Request hardening.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8081").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Network-origin trust configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Allowed client addresses: exact IPs or IPv4 CIDR ranges.
    pub allowed_ips: Vec<String>,

    /// Allow loopback clients regardless of the allow-list.
    pub development_mode: bool,

    /// Proxy headers consulted for the client address, highest precedence
    /// first. The transport peer address is always consulted last.
    pub trusted_headers: Vec<String>,

    /// Denials from one client within a rate-limit window before a warning
    /// that its alerts are crowding older entries out of the audit log.
    pub denial_warn_threshold: u32,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            allowed_ips: vec!["127.0.0.1".to_string(), "::1".to_string()],
            development_mode: false,
            trusted_headers: vec![
                "cf-connecting-ip".to_string(),
                "true-client-ip".to_string(),
                "x-real-ip".to_string(),
                "x-forwarded-for".to_string(),
            ],
            denial_warn_threshold: 100,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per client within one window.
    pub max_requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// How long a client stays blocked after exceeding the limit.
    pub block_secs: u64,

    /// Interval between sweeps of idle records.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_secs: 15 * 60,
            block_secs: 15 * 60,
            sweep_interval_secs: 5 * 60,
        }
    }
}

/// CSRF token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Token time-to-live in seconds.
    pub ttl_secs: u64,

    /// Interval between sweeps of expired tokens.
    pub sweep_interval_secs: u64,

    /// Body field accepted as an alternative to the `X-CSRF-Token` header.
    pub body_field: String,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 60 * 60,
            sweep_interval_secs: 10 * 60,
            body_field: "_csrf".to_string(),
        }
    }
}

/// Audit log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Path of the JSON audit document.
    pub path: String,

    /// Maximum number of retained entries.
    pub max_entries: usize,

    /// Entries older than this are dropped on every write.
    pub retention_days: u32,

    /// Run anomaly detection after successful logins.
    pub alert_on_suspicious_activity: bool,

    /// Number of most recent entries inspected by the anomaly detector.
    pub anomaly_window: usize,

    /// Offset used for the unusual-hour check. Server local offset when unset.
    pub utc_offset_minutes: Option<i32>,

    /// Interval between background retention passes.
    pub trim_interval_secs: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: "data/audit-log.json".to_string(),
            max_entries: 1000,
            retention_days: 90,
            alert_on_suspicious_activity: true,
            anomaly_window: 20,
            utc_offset_minutes: None,
            trim_interval_secs: 60 * 60,
        }
    }
}

/// Admin credentials.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Admin password.
    pub password: String,

    /// Session lifetime in seconds.
    pub session_ttl_secs: u64,

    /// Interval between expired-session sweeps in seconds.
    pub session_sweep_interval_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            // WARNING: This is a placeholder! Change this in production.
            password: DEFAULT_ADMIN_PASSWORD.to_string(),
            session_ttl_secs: 8 * 60 * 60,
            session_sweep_interval_secs: 10 * 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,

    /// Total request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1MB
            request_timeout_secs: 30,
        }
    }
}
