//! Custom Resource Definitions for the Webhook Relay Operator

mod webhook_relay_forward;

pub use webhook_relay_forward::*;

use kube::CustomResourceExt;

/// Generate CRD YAML manifests for all custom resources
pub fn generate_crds() -> Result<Vec<String>, serde_yaml::Error> {
    Ok(vec![serde_yaml::to_string(&WebhookRelayForward::crd())?])
}
