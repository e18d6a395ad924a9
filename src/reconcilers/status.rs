//! Status write-back for WebhookRelayForward resources

use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use tracing::info;

use crate::cache::BucketCache;
use crate::crd::{WebhookRelayForward, WebhookRelayForwardSpec, WebhookRelayForwardStatus};
use crate::{Error, Result};

/// Base of the default public webhook endpoints for the API at `api_url`
pub fn webhooks_base_url(api_url: &str) -> String {
    format!("{}/webhooks", api_url.trim_end_matches('/'))
}

/// Public endpoints of the declared inputs that already exist remotely.
/// Inputs without a custom domain are served under [`webhooks_base_url`].
pub fn public_endpoints(
    spec: &WebhookRelayForwardSpec,
    cache: &BucketCache,
    api_url: &str,
) -> Vec<String> {
    let base_url = webhooks_base_url(api_url);
    let mut endpoints = Vec::new();

    for bucket_spec in &spec.buckets {
        let Some(bucket) = cache.get(&bucket_spec.reference) else {
            continue;
        };
        for input_spec in &bucket_spec.inputs {
            let Some(input) = bucket.input_named(&input_spec.name) else {
                continue;
            };
            let endpoint = if input.custom_domain.is_empty() {
                format!("{}/{}", base_url, input.id)
            } else {
                format!("https://{}{}", input.custom_domain, input.path_prefix)
            };
            endpoints.push(endpoint);
        }
    }

    endpoints
}

/// Merge-patch the status when it differs from what's recorded.
/// Returns whether a patch was sent.
pub async fn update_status(
    forward: &WebhookRelayForward,
    client: &Client,
    public_endpoints: Vec<String>,
) -> Result<bool> {
    let status = WebhookRelayForwardStatus {
        public_endpoints,
        observed_generation: forward.metadata.generation,
    };

    if forward.status.as_ref() == Some(&status) {
        return Ok(false);
    }

    let namespace = forward.namespace().unwrap_or_default();
    let name = forward.name_any();
    let forwards: Api<WebhookRelayForward> = Api::namespaced(client.clone(), &namespace);
    // Spelled out so an empty endpoint list clears the previous one
    let patch = serde_json::json!({
        "status": {
            "publicEndpoints": status.public_endpoints,
            "observedGeneration": status.observed_generation,
        }
    });

    forwards
        .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .map_err(|e| Error::KubeError(format!("Failed to update status: {}", e)))?;

    info!(
        "Updated status for {}/{}: {} public endpoints",
        namespace,
        name,
        status.public_endpoints.len()
    );

    Ok(true)
}
