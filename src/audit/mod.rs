//! Audit subsystem.
//!
//! # Data Flow
//! ```text
//! login / logout / action handlers, request gate (blocked IPs)
//!     → store.rs (AuditLog handle → single writer task)
//!         → entry.rs (immutable records, newest first)
//!         → anomaly.rs (after each successful login)
//!         → JSON document on disk
//! ```
//!
//! # Design Decisions
//! - The writer task is the only code that touches the audit file
//! - Security alerts are ordinary entries with kind `security_alert`
//! - Audit durability never blocks the admin request it describes

pub mod anomaly;
pub mod entry;
pub mod store;

pub use anomaly::AnomalyDetector;
pub use entry::{Alert, AlertKind, AuditEntry, EventKind, EventOrigin, Severity};
pub use store::{AuditDocument, AuditLog, AuditReport, AuditSummary};
