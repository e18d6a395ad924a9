//! Shared fakes and builders for integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;

use webhookrelay_operator::cache::BucketCache;
use webhookrelay_operator::crd::{
    BucketSpec, InputSpec, OutputSpec, WebhookRelayForward, WebhookRelayForwardSpec,
};
use webhookrelay_operator::reconcilers::workload::DeploymentStore;
use webhookrelay_operator::relay::{ApiError, Bucket, Input, Output, RelayApi};
use webhookrelay_operator::session::{
    Credentials, Session, SessionFactory, SessionIdentity,
};
use webhookrelay_operator::{Error, Result};

/// Ordered record of remote calls, shareable between fakes
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

// ============================================================================
// Webhook Relay API
// ============================================================================

#[derive(Default)]
pub struct FakeRelayApi {
    pub buckets: Mutex<Vec<Bucket>>,
    pub created: Mutex<Vec<Input>>,
    pub updated: Mutex<Vec<Input>>,
    pub deleted: Mutex<Vec<String>>,
    /// Input names whose calls fail
    pub failing: Mutex<HashSet<String>>,
    pub journal: Journal,
    next_id: AtomicUsize,
}

impl FakeRelayApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub fn fail_on(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    fn check(&self, method: &'static str, name: &str) -> std::result::Result<(), ApiError> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{} input {}", method, name));
        if self.failing.lock().unwrap().contains(name) {
            return Err(ApiError::Status {
                method,
                url: format!("fake://inputs/{}", name),
                status: 500,
                body: "boom".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RelayApi for FakeRelayApi {
    async fn list_buckets(&self) -> std::result::Result<Vec<Bucket>, ApiError> {
        Ok(self.buckets.lock().unwrap().clone())
    }

    async fn create_input(&self, input: &Input) -> std::result::Result<Input, ApiError> {
        self.check("POST", &input.name)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let created = Input {
            id: format!("new-{}", id),
            ..input.clone()
        };
        self.created.lock().unwrap().push(created.clone());
        let mut buckets = self.buckets.lock().unwrap();
        if let Some(bucket) = buckets.iter_mut().find(|b| b.id == created.bucket_id) {
            bucket.inputs.push(created.clone());
        }
        Ok(created)
    }

    async fn update_input(&self, input: &Input) -> std::result::Result<Input, ApiError> {
        self.check("PUT", &input.name)?;
        self.updated.lock().unwrap().push(input.clone());
        let mut buckets = self.buckets.lock().unwrap();
        let stored = buckets
            .iter_mut()
            .filter(|b| b.id == input.bucket_id)
            .flat_map(|b| b.inputs.iter_mut())
            .find(|i| i.id == input.id);
        if let Some(stored) = stored {
            *stored = input.clone();
        }
        Ok(input.clone())
    }

    async fn delete_input(&self, _bucket_id: &str, input_id: &str) -> std::result::Result<(), ApiError> {
        self.check("DELETE", input_id)?;
        self.deleted.lock().unwrap().push(input_id.to_string());
        Ok(())
    }
}

// ============================================================================
// Deployments
// ============================================================================

#[derive(Default)]
pub struct InMemoryDeployments {
    pub items: Mutex<HashMap<String, Deployment>>,
    pub creates: AtomicUsize,
    pub replaces: AtomicUsize,
    pub unavailable: std::sync::atomic::AtomicBool,
    pub journal: Journal,
}

impl InMemoryDeployments {
    pub fn with_journal(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub fn stored(&self, namespace: &str, name: &str) -> Option<Deployment> {
        self.items
            .lock()
            .unwrap()
            .get(&format!("{}/{}", namespace, name))
            .cloned()
    }

    pub fn put(&self, deployment: Deployment) {
        let key = format!(
            "{}/{}",
            deployment.namespace().unwrap_or_default(),
            deployment.name_any()
        );
        self.items.lock().unwrap().insert(key, deployment);
    }

    fn guard(&self, op: &str, name: &str) -> Result<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{} deployment {}", op, name));
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::KubeError("api server unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DeploymentStore for InMemoryDeployments {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        self.guard("get", name)?;
        Ok(self.stored(namespace, name))
    }

    async fn create(&self, _namespace: &str, deployment: &Deployment) -> Result<Deployment> {
        self.guard("create", &deployment.name_any())?;
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.put(deployment.clone());
        Ok(deployment.clone())
    }

    async fn replace(&self, _namespace: &str, name: &str, deployment: &Deployment) -> Result<Deployment> {
        self.guard("replace", name)?;
        self.replaces.fetch_add(1, Ordering::SeqCst);
        self.put(deployment.clone());
        Ok(deployment.clone())
    }
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Default)]
pub struct FakeSessionFactory {
    pub builds: AtomicUsize,
    pub fail: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl SessionFactory for FakeSessionFactory {
    async fn build(
        &self,
        _instance: &WebhookRelayForward,
        identity: SessionIdentity,
    ) -> Result<Session> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::SessionError("secret not found".to_string()));
        }
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(Session::new(
            identity,
            test_credentials(),
            Arc::new(FakeRelayApi::new()),
            Arc::new(BucketCache::new()),
        ))
    }
}

pub fn test_credentials() -> Credentials {
    Credentials::new("test-key", "test-secret")
}

/// Session whose cache and fake API both start out holding `buckets`
pub fn session_with(api: Arc<FakeRelayApi>, buckets: Vec<Bucket>) -> Session {
    *api.buckets.lock().unwrap() = buckets.clone();
    Session::new(
        SessionIdentity {
            name: "fwd".to_string(),
            generation: 1,
            uid: "uid-1".to_string(),
        },
        test_credentials(),
        api,
        Arc::new(BucketCache::from_buckets(buckets)),
    )
}

// ============================================================================
// Builders
// ============================================================================

pub fn input_spec(name: &str) -> InputSpec {
    InputSpec {
        name: name.to_string(),
        ..Default::default()
    }
}

pub fn bucket_spec(reference: &str, inputs: Vec<InputSpec>) -> BucketSpec {
    BucketSpec {
        reference: reference.to_string(),
        inputs,
        ..Default::default()
    }
}

pub fn output_spec(name: &str) -> OutputSpec {
    OutputSpec {
        name: name.to_string(),
        ..Default::default()
    }
}

pub fn remote_input(id: &str, name: &str, bucket_id: &str) -> Input {
    Input {
        id: id.to_string(),
        name: name.to_string(),
        bucket_id: bucket_id.to_string(),
        ..Default::default()
    }
}

pub fn remote_output(id: &str, name: &str) -> Output {
    Output {
        id: id.to_string(),
        name: name.to_string(),
        ..Default::default()
    }
}

pub fn remote_bucket(id: &str, name: &str, inputs: Vec<Input>) -> Bucket {
    Bucket {
        id: id.to_string(),
        name: name.to_string(),
        inputs,
        ..Default::default()
    }
}

pub fn headers(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
        .collect()
}

pub fn forward(name: &str, generation: i64, uid: &str, spec: WebhookRelayForwardSpec) -> WebhookRelayForward {
    let mut forward = WebhookRelayForward::new(name, spec);
    forward.metadata.namespace = Some("default".to_string());
    forward.metadata.generation = Some(generation);
    forward.metadata.uid = Some(uid.to_string());
    forward
}
