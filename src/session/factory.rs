//! Session factory backed by Kubernetes secrets and the HTTP API client

use std::sync::Arc;

use async_trait::async_trait;
use kube::{Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{credentials, Credentials, Session, SessionFactory, SessionIdentity};
use crate::cache::{self, BucketCache};
use crate::config::OperatorConfig;
use crate::crd::WebhookRelayForward;
use crate::relay::{HttpRelayClient, RelayApi};
use crate::{Error, Result};

/// Derives credentials from the resource's secret (or the operator's own),
/// then connects a client and primes a bucket cache for it.
pub struct KubeSessionFactory {
    client: Client,
    config: Arc<OperatorConfig>,
}

impl KubeSessionFactory {
    pub fn new(client: Client, config: Arc<OperatorConfig>) -> Self {
        Self { client, config }
    }

    async fn credentials_for(&self, instance: &WebhookRelayForward) -> Result<Credentials> {
        match instance.spec.secret_ref_name.as_deref() {
            Some(name) if !name.is_empty() => {
                let namespace = instance.namespace().unwrap_or_default();
                credentials::from_secret(&self.client, &namespace, name).await
            }
            _ => self.config.credentials().ok_or_else(|| {
                Error::SessionError(
                    "no credentials: set spec.secretRefName or RELAY_KEY and RELAY_SECRET"
                        .to_string(),
                )
            }),
        }
    }
}

#[async_trait]
impl SessionFactory for KubeSessionFactory {
    async fn build(
        &self,
        instance: &WebhookRelayForward,
        identity: SessionIdentity,
    ) -> Result<Session> {
        let credentials = self.credentials_for(instance).await?;

        let client = HttpRelayClient::new(
            &self.config.api_url,
            credentials.key.clone(),
            credentials.secret.clone(),
            self.config.api_timeout(),
        )
        .map_err(|e| Error::SessionError(e.to_string()))?;
        let api: Arc<dyn RelayApi> = Arc::new(client);

        let bucket_cache = Arc::new(BucketCache::new());
        match cache::refresh(api.as_ref(), &bucket_cache).await {
            Ok(count) => info!(buckets = count, "Bucket cache primed"),
            Err(e) => warn!(error = %e, "Initial bucket listing failed, cache stays empty"),
        }

        let token = CancellationToken::new();
        cache::spawn_bucket_watcher(
            Arc::clone(&api),
            Arc::clone(&bucket_cache),
            self.config.bucket_refresh_interval(),
            token.clone(),
        );

        Ok(Session::new(identity, credentials, api, bucket_cache).with_watcher(token))
    }
}
