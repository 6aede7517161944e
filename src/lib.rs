//! Admin access control and audit gate.
//!
//! Guards an administrative HTTP surface: resolves the client identity,
//! enforces an IP allow-list, throttles unlisted clients, requires single-use
//! CSRF tokens on mutating requests, and keeps an append-only audit log with
//! anomaly detection over admin logins.

pub mod admin;
pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::GateConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
