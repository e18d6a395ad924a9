//! Forwarding agent Deployment reconciliation
//!
//! The desired Deployment is rebuilt from scratch on every pass and compared
//! container by container. Any difference replaces the whole pod template
//! spec; a partially patched container/env set would run an inconsistent agent.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, PodSpec, PodTemplateSpec, ResourceRequirements,
    SecretKeySelector,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use kube::api::PostParams;
use kube::{Api, Client, ResourceExt};
use std::collections::BTreeMap;
use tracing::info;

use super::equality::{all_equal, FieldCheck};
use crate::crd::{
    ResourceRequirementsSpec, WebhookRelayForward, WebhookRelayForwardSpec,
    ACCESS_TOKEN_KEY_NAME, ACCESS_TOKEN_SECRET_NAME,
};
use crate::session::Credentials;
use crate::{Error, Result};

/// Agent container name
pub const CONTAINER_NAME: &str = "webhookrelayd";

/// Buckets the agent subscribes to, comma separated
pub const BUCKETS_ENV: &str = "BUCKETS";
/// Access token key
pub const KEY_ENV: &str = "KEY";
/// Access token secret
pub const SECRET_ENV: &str = "SECRET";

/// Name of the Deployment managed for an instance
pub fn deployment_name(instance_name: &str) -> String {
    format!("{}-whr-deployment", instance_name)
}

/// Build the desired Deployment for an instance
pub fn build_deployment(
    forward: &WebhookRelayForward,
    credentials: &Credentials,
    default_image: &str,
) -> Deployment {
    let name = forward.name_any();
    let labels = build_labels(&name);

    Deployment {
        metadata: ObjectMeta {
            name: Some(deployment_name(&name)),
            namespace: forward.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![build_owner_reference(forward)]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(build_pod_spec(&forward.spec, credentials, default_image)),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_pod_spec(
    spec: &WebhookRelayForwardSpec,
    credentials: &Credentials,
    default_image: &str,
) -> PodSpec {
    let image = spec
        .image
        .clone()
        .filter(|image| !image.is_empty())
        .unwrap_or_else(|| default_image.to_string());

    PodSpec {
        containers: vec![Container {
            name: CONTAINER_NAME.to_string(),
            image: Some(image),
            image_pull_policy: Some("Always".to_string()),
            env: Some(env_for_deployment(spec, credentials)),
            resources: spec.resources.as_ref().map(resource_requirements),
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Agent environment: subscribed buckets plus access token, taken from the
/// referenced secret when there is one, otherwise from the session credentials.
pub fn env_for_deployment(spec: &WebhookRelayForwardSpec, credentials: &Credentials) -> Vec<EnvVar> {
    let buckets: Vec<&str> = spec
        .buckets
        .iter()
        .map(|bucket| bucket.reference.as_str())
        .collect();

    let mut env = vec![EnvVar {
        name: BUCKETS_ENV.to_string(),
        value: Some(buckets.join(",")),
        ..Default::default()
    }];

    match spec.secret_ref_name.as_deref() {
        Some(secret) if !secret.is_empty() => {
            env.push(secret_env(KEY_ENV, secret, ACCESS_TOKEN_KEY_NAME));
            env.push(secret_env(SECRET_ENV, secret, ACCESS_TOKEN_SECRET_NAME));
        }
        _ => {
            env.push(literal_env(KEY_ENV, &credentials.key));
            env.push(literal_env(SECRET_ENV, &credentials.secret));
        }
    }

    env
}

fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn literal_env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}

fn resource_requirements(resources: &ResourceRequirementsSpec) -> ResourceRequirements {
    let quantities = |values: &BTreeMap<String, String>| -> Option<BTreeMap<String, Quantity>> {
        if values.is_empty() {
            None
        } else {
            Some(
                values
                    .iter()
                    .map(|(k, v)| (k.clone(), Quantity(v.clone())))
                    .collect(),
            )
        }
    };

    ResourceRequirements {
        limits: quantities(&resources.limits),
        requests: quantities(&resources.requests),
        ..Default::default()
    }
}

fn build_labels(name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/name".to_string(),
        "webhookrelay-forwarder".to_string(),
    );
    labels.insert("app.kubernetes.io/instance".to_string(), name.to_string());
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "webhookrelay-operator".to_string(),
    );
    labels
}

fn build_owner_reference(forward: &WebhookRelayForward) -> OwnerReference {
    OwnerReference {
        api_version: "forward.webhookrelay.com/v1".to_string(),
        kind: "WebhookRelayForward".to_string(),
        name: forward.name_any(),
        uid: forward.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

// ============================================================================
// Comparison
// ============================================================================

/// Container fields the operator manages, in comparison order
pub const CONTAINER_EQUALITY: &[FieldCheck<Container>] =
    &[("image", same_image), ("env", same_env)];

/// Environment variable fields, in comparison order
pub const ENV_VAR_EQUALITY: &[FieldCheck<EnvVar>] = &[
    ("name", same_env_name),
    ("value", same_env_value),
    ("value_from", same_env_source),
];

fn same_image(a: &Container, b: &Container) -> bool {
    a.image == b.image
}

fn same_env(a: &Container, b: &Container) -> bool {
    let current = a.env.as_deref().unwrap_or_default();
    let desired = b.env.as_deref().unwrap_or_default();

    current.len() == desired.len()
        && current
            .iter()
            .zip(desired)
            .all(|(c, d)| all_equal(ENV_VAR_EQUALITY, c, d))
}

fn same_env_name(a: &EnvVar, b: &EnvVar) -> bool {
    a.name == b.name
}

fn same_env_value(a: &EnvVar, b: &EnvVar) -> bool {
    a.value.as_deref().unwrap_or_default() == b.value.as_deref().unwrap_or_default()
}

fn same_env_source(a: &EnvVar, b: &EnvVar) -> bool {
    env_var_source_equal(a.value_from.as_ref(), b.value_from.as_ref())
}

/// Both unset is equal, one unset is not, both set compares deeply
pub fn env_var_source_equal(current: Option<&EnvVarSource>, desired: Option<&EnvVarSource>) -> bool {
    match (current, desired) {
        (None, None) => true,
        (Some(current), Some(desired)) => current == desired,
        _ => false,
    }
}

pub fn containers_equal(current: &Container, desired: &Container) -> bool {
    all_equal(CONTAINER_EQUALITY, current, desired)
}

fn containers(deployment: &Deployment) -> &[Container] {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .map(|pod| pod.containers.as_slice())
        .unwrap_or_default()
}

/// Compare a deployed Deployment with the desired one.
///
/// Returns the Deployment to write back and whether it changed. When changed,
/// it is `current` with the pod template spec swapped for the desired one.
pub fn check_deployment(current: &Deployment, desired: &Deployment) -> (Deployment, bool) {
    let current_containers = containers(current);
    let desired_containers = containers(desired);

    let changed = current_containers.len() != desired_containers.len()
        || current_containers
            .iter()
            .zip(desired_containers)
            .any(|(c, d)| !containers_equal(c, d));

    let mut patched = current.clone();
    if changed {
        let desired_pod = desired
            .spec
            .as_ref()
            .and_then(|spec| spec.template.spec.clone());
        match patched.spec.as_mut() {
            Some(spec) => spec.template.spec = desired_pod,
            None => patched.spec = desired.spec.clone(),
        }
    }

    (patched, changed)
}

// ============================================================================
// Apply
// ============================================================================

/// What a workload reconcile did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadAction {
    Created,
    Unchanged,
    Replaced,
}

impl WorkloadAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadAction::Created => "created",
            WorkloadAction::Unchanged => "unchanged",
            WorkloadAction::Replaced => "replaced",
        }
    }
}

/// Deployment reads and writes needed by [`reconcile_deployment`]
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// `None` when the Deployment doesn't exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Deployment>>;

    async fn create(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment>;

    async fn replace(&self, namespace: &str, name: &str, deployment: &Deployment) -> Result<Deployment>;
}

/// [`DeploymentStore`] backed by the Kubernetes API
pub struct KubeDeploymentStore {
    client: Client,
}

impl KubeDeploymentStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl DeploymentStore for KubeDeploymentStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        self.api(namespace)
            .get_opt(name)
            .await
            .map_err(|e| Error::KubeError(format!("Failed to get Deployment {}: {}", name, e)))
    }

    async fn create(&self, namespace: &str, deployment: &Deployment) -> Result<Deployment> {
        self.api(namespace)
            .create(&PostParams::default(), deployment)
            .await
            .map_err(|e| Error::KubeError(format!("Failed to create Deployment: {}", e)))
    }

    async fn replace(&self, namespace: &str, name: &str, deployment: &Deployment) -> Result<Deployment> {
        self.api(namespace)
            .replace(name, &PostParams::default(), deployment)
            .await
            .map_err(|e| Error::KubeError(format!("Failed to update Deployment: {}", e)))
    }
}

/// Create the Deployment if missing, otherwise replace its pod template spec
/// when it differs from `desired`.
pub async fn reconcile_deployment(
    store: &dyn DeploymentStore,
    desired: &Deployment,
) -> Result<WorkloadAction> {
    let namespace = desired.namespace().unwrap_or_default();
    let name = desired.name_any();

    let Some(current) = store.get(&namespace, &name).await? else {
        info!("Creating a new Deployment {}/{}", namespace, name);
        store.create(&namespace, desired).await?;
        return Ok(WorkloadAction::Created);
    };

    let (patched, changed) = check_deployment(&current, desired);
    if !changed {
        info!("Deployment {}/{} is up to date", namespace, name);
        return Ok(WorkloadAction::Unchanged);
    }

    store.replace(&namespace, &name, &patched).await?;
    info!("Replaced pod template of Deployment {}/{}", namespace, name);

    Ok(WorkloadAction::Replaced)
}
