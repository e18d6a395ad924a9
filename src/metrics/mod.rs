//! Prometheus metrics for the Webhook Relay Operator
//!
//! This module exposes metrics for monitoring operator health and convergence.

pub mod prometheus;

pub use prometheus::*;
