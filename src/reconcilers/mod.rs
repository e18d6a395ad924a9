//! Reconciliation logic for WebhookRelayForward resources

pub mod equality;
pub mod forward;
pub mod inputs;
pub mod status;
pub mod workload;
