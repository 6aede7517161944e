//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Build stores → Spawn housekeeping → Serve
//!
//! Housekeeping (housekeeping.rs):
//!     Fixed-interval sweeps of rate-limit records, CSRF tokens, sessions,
//!     and audit retention
//!
//! Shutdown (shutdown.rs / signals.rs):
//!     SIGTERM/SIGINT → latched watch signal → server drains, sweepers exit
//! ```

pub mod housekeeping;
pub mod shutdown;
pub mod signals;

pub use housekeeping::Housekeeper;
pub use shutdown::{Shutdown, ShutdownSignal};
