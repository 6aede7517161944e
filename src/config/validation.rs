//! Configuration validation.
//!
//! # Responsibilities
//! - Every allow-list entry parses as an IP or CIDR
//! - Trusted proxy headers are valid header names
//! - Limits, windows and lifetimes are non-zero
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GateConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::GateConfig;
use crate::security::access_control::AllowEntry;

/// Ten years. Longer windows, blocks and lifetimes are configuration mistakes.
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;
pub const MAX_RETENTION_DAYS: u32 = 10 * 365;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GateConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "not a socket address"));
    }

    for entry in &config.access.allowed_ips {
        if let Err(e) = entry.parse::<AllowEntry>() {
            errors.push(ValidationError::new("access.allowed_ips", e.to_string()));
        }
    }
    for header in &config.access.trusted_headers {
        if HeaderName::from_bytes(header.trim().to_ascii_lowercase().as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "access.trusted_headers",
                format!("'{}' is not a valid header name", header),
            ));
        }
    }

    let counts = [
        ("rate_limit.max_requests", u64::from(config.rate_limit.max_requests)),
        ("access.denial_warn_threshold", u64::from(config.access.denial_warn_threshold)),
        ("audit.max_entries", config.audit.max_entries as u64),
        ("audit.anomaly_window", config.audit.anomaly_window as u64),
        ("security.max_body_size", config.security.max_body_size as u64),
    ];
    for (field, value) in counts {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }

    let durations = [
        ("rate_limit.window_secs", config.rate_limit.window_secs),
        ("rate_limit.block_secs", config.rate_limit.block_secs),
        ("rate_limit.sweep_interval_secs", config.rate_limit.sweep_interval_secs),
        ("csrf.ttl_secs", config.csrf.ttl_secs),
        ("csrf.sweep_interval_secs", config.csrf.sweep_interval_secs),
        ("audit.trim_interval_secs", config.audit.trim_interval_secs),
        ("admin.session_ttl_secs", config.admin.session_ttl_secs),
        ("admin.session_sweep_interval_secs", config.admin.session_sweep_interval_secs),
        ("security.request_timeout_secs", config.security.request_timeout_secs),
    ];
    for (field, value) in durations {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        } else if value > MAX_DURATION_SECS {
            errors.push(ValidationError::new(
                field,
                format!("must be at most {} seconds", MAX_DURATION_SECS),
            ));
        }
    }

    if config.audit.retention_days == 0 || config.audit.retention_days > MAX_RETENTION_DAYS {
        errors.push(ValidationError::new(
            "audit.retention_days",
            format!("must be between 1 and {}", MAX_RETENTION_DAYS),
        ));
    }

    if config.csrf.body_field.trim().is_empty() {
        errors.push(ValidationError::new("csrf.body_field", "must not be empty"));
    }
    if config.audit.path.trim().is_empty() {
        errors.push(ValidationError::new("audit.path", "must not be empty"));
    }
    if config.admin.password.is_empty() {
        errors.push(ValidationError::new("admin.password", "must not be empty"));
    }
    if let Some(minutes) = config.audit.utc_offset_minutes {
        if !(-24 * 60 < minutes && minutes < 24 * 60) {
            errors.push(ValidationError::new("audit.utc_offset_minutes", "must be within one day"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
