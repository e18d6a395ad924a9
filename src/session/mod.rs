//! Webhook Relay API sessions, one per managed resource
//!
//! A session pins the credentials, API client and bucket cache to the exact
//! resource instance it was built for. A resource that is recreated or whose
//! generation moves gets a new session; nothing carries over.

mod credentials;
mod factory;

pub use credentials::{from_secret, secret_value, Credentials};
pub use factory::KubeSessionFactory;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::BucketCache;
use crate::crd::WebhookRelayForward;
use crate::metrics::prometheus::SESSION_REBUILDS;
use crate::relay::RelayApi;
use crate::Result;

/// The resource instance a session was built for
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionIdentity {
    pub name: String,
    pub generation: i64,
    pub uid: String,
}

impl SessionIdentity {
    pub fn of(instance: &WebhookRelayForward) -> Self {
        Self {
            name: instance.name_any(),
            generation: instance.metadata.generation.unwrap_or_default(),
            uid: instance.metadata.uid.clone().unwrap_or_default(),
        }
    }
}

/// Credentials, API client and bucket cache for one resource instance
pub struct Session {
    identity: SessionIdentity,
    credentials: Credentials,
    api: Arc<dyn RelayApi>,
    cache: Arc<BucketCache>,
    watcher: Option<CancellationToken>,
}

impl Session {
    pub fn new(
        identity: SessionIdentity,
        credentials: Credentials,
        api: Arc<dyn RelayApi>,
        cache: Arc<BucketCache>,
    ) -> Self {
        Self {
            identity,
            credentials,
            api,
            cache,
            watcher: None,
        }
    }

    /// Tie a background cache watcher to this session's lifetime
    pub fn with_watcher(mut self, token: CancellationToken) -> Self {
        self.watcher = Some(token);
        self
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn api(&self) -> &dyn RelayApi {
        self.api.as_ref()
    }

    pub fn cache(&self) -> &BucketCache {
        &self.cache
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(token) = &self.watcher {
            token.cancel();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("credentials", &self.credentials)
            .field("cached_buckets", &self.cache.len())
            .finish_non_exhaustive()
    }
}

/// Builds sessions for resource instances
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn build(
        &self,
        instance: &WebhookRelayForward,
        identity: SessionIdentity,
    ) -> Result<Session>;
}

/// Held sessions keyed by `namespace/name`
pub struct SessionManager {
    factory: Arc<dyn SessionFactory>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionManager {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self {
            factory,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Return the session for `instance`, rebuilding it when none is held or
    /// the held one belongs to a different name, generation or uid.
    pub async fn ensure_session(&self, instance: &WebhookRelayForward) -> Result<Arc<Session>> {
        let key = instance_key(instance);
        let identity = SessionIdentity::of(instance);

        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(&key) {
                if session.identity() == &identity {
                    return Ok(Arc::clone(session));
                }
            }
        }

        // Stale sessions never outlive a failed rebuild
        if let Some(stale) = self.sessions.write().await.remove(&key) {
            info!(
                key = %key,
                previous_generation = stale.identity().generation,
                generation = identity.generation,
                "Instance identity changed, discarding session"
            );
        }

        let session = match self.factory.build(instance, identity).await {
            Ok(session) => Arc::new(session),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to configure Webhook Relay API client");
                return Err(e);
            }
        };

        SESSION_REBUILDS.inc();
        info!(
            key = %key,
            credentials = %session.credentials().fingerprint(),
            "API client initialized"
        );

        self.sessions
            .write()
            .await
            .insert(key, Arc::clone(&session));

        Ok(session)
    }

    /// Drop the session held for `namespace/name`, if any
    pub async fn forget(&self, namespace: &str, name: &str) -> bool {
        self.sessions
            .write()
            .await
            .remove(&format!("{}/{}", namespace, name))
            .is_some()
    }

    /// Keep only sessions whose `namespace/name` key passes `keep`.
    /// Returns how many were dropped.
    pub async fn retain(&self, keep: impl Fn(&str) -> bool) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|key, _| keep(key));
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn instance_key(instance: &WebhookRelayForward) -> String {
    format!(
        "{}/{}",
        instance.namespace().unwrap_or_default(),
        instance.name_any()
    )
}
