//! Axum middleware wrapping the request gate.

pub mod gate;

pub use gate::{open_gate, restricted_gate};
