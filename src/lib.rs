//! Webhook Relay Kubernetes Operator
//!
//! This operator runs Webhook Relay forwarding agents in Kubernetes and keeps
//! the inputs of their buckets configured, driven by `WebhookRelayForward`
//! custom resources.

pub mod cache;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod metrics;
pub mod reconcilers;
pub mod relay;
pub mod session;

pub use error::{Error, Result};
