//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming admin request:
//!     → client_ip.rs (resolve identity from trusted headers + peer)
//!     → access_control.rs (allow-list / CIDR evaluation)
//!     → rate_limit.rs (per-client window, skipped for allow-listed clients)
//!     → csrf.rs (single-use token for mutating requests)
//!     → Pass to admin handlers
//! ```
//! `gate.rs` composes the chain; the HTTP glue lives in `http::middleware`.
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input; header trust is configuration
//! - Shared tables are explicit objects injected into the gate

pub mod access_control;
pub mod client_ip;
pub mod csrf;
pub mod gate;
pub mod rate_limit;

pub use access_control::{AccessController, AccessPolicy, AllowEntry};
pub use client_ip::{ClientIdentity, IdentityResolver};
pub use csrf::CsrfTokenStore;
pub use gate::{DenialTracker, GateScope, RequestGate};
pub use rate_limit::RateLimiter;
