//! WebhookRelayForward Custom Resource Definition

use kube::CustomResource;
use schemars::gen::SchemaGenerator;
use schemars::schema::Schema;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Secret key holding the access token key
pub const ACCESS_TOKEN_KEY_NAME: &str = "key";

/// Secret key holding the access token secret
pub const ACCESS_TOKEN_SECRET_NAME: &str = "secret";

/// Sentinel for `responseFromOutput` that lets any output answer
pub const ANY_OUTPUT: &str = "anyOutput";

/// WebhookRelayForward resource specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "forward.webhookrelay.com",
    version = "v1",
    kind = "WebhookRelayForward",
    plural = "webhookrelayforwards",
    singular = "webhookrelayforward",
    shortname = "whrf",
    namespaced,
    status = "WebhookRelayForwardStatus",
    printcolumn = r#"{"name": "Image", "type": "string", "jsonPath": ".spec.image"}"#,
    printcolumn = r#"{"name": "Endpoints", "type": "string", "jsonPath": ".status.publicEndpoints"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRelayForwardSpec {
    /// Buckets the forwarding agent subscribes to
    #[serde(default)]
    pub buckets: Vec<BucketSpec>,

    /// Agent image override (defaults to the operator-wide image)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Secret holding `key` and `secret` access token fields.
    /// When unset, the operator's own credentials are used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref_name: Option<String>,

    /// Resource requirements for the agent container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirementsSpec>,
}

/// Bucket subscription and routing configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BucketSpec {
    /// Bucket name or ID
    #[serde(rename = "ref")]
    pub reference: String,

    /// Bucket description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Inputs to configure inside the bucket
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputSpec>,

    /// Outputs inside the bucket, used to resolve `responseFromOutput`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputSpec>,
}

/// Desired configuration of a bucket input
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InputSpec {
    /// Input name, unique within the bucket
    pub name: String,

    /// Function to run on incoming webhooks
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub function_id: String,

    /// Static response headers
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub response_headers: BTreeMap<String, Vec<String>>,

    /// Static response status code (0 leaves it to the service)
    #[serde(default)]
    pub response_status_code: i32,

    /// Static response body
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub response_body: String,

    /// Output (by name or ID, or `anyOutput`) whose response is returned to the caller
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub response_from_output: String,

    /// Custom domain. Unset keeps whatever domain the input already has,
    /// an empty string clears it.
    #[serde(default, skip_serializing_if = "Tristate::is_unset")]
    pub custom_domain: Tristate,

    /// Path prefix for custom domain routing
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path_prefix: String,

    /// Input description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Output declared inside a bucket
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutputSpec {
    /// Output name
    pub name: String,

    /// Destination URL
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub destination: String,

    /// Function to run before forwarding
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub function_id: String,

    /// Internal outputs are delivered through the forwarding agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal: Option<bool>,

    /// Keep the destination path as-is
    #[serde(default)]
    pub lock_path: bool,

    /// Verify destination TLS certificates
    #[serde(default)]
    pub tls_verification: bool,

    /// Headers overridden on forwarded requests
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub override_headers: BTreeMap<String, String>,

    /// Output description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// Resource requirements specification
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirementsSpec {
    /// Resource limits (cpu, memory)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,

    /// Resource requests (cpu, memory)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

/// WebhookRelayForward status
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRelayForwardStatus {
    /// Public endpoints of the configured inputs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub public_endpoints: Vec<String>,

    /// Generation the status was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// A string field that distinguishes "not declared" from "declared empty".
///
/// On the wire this is a plain optional string: absent (or null) is
/// [`Tristate::Unset`], `""` is [`Tristate::Empty`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Tristate {
    #[default]
    Unset,
    Empty,
    Value(String),
}

impl Tristate {
    pub fn is_unset(&self) -> bool {
        matches!(self, Tristate::Unset)
    }

    /// Value to send to the API. `Unset` keeps `current`, the value the
    /// remote side already holds.
    pub fn resolve(&self, current: Option<&str>) -> String {
        match self {
            Tristate::Unset => current.unwrap_or_default().to_string(),
            Tristate::Empty => String::new(),
            Tristate::Value(value) => value.clone(),
        }
    }
}

impl From<&str> for Tristate {
    fn from(value: &str) -> Self {
        if value.is_empty() {
            Tristate::Empty
        } else {
            Tristate::Value(value.to_string())
        }
    }
}

impl From<Option<&str>> for Tristate {
    fn from(value: Option<&str>) -> Self {
        value.map(Tristate::from).unwrap_or_default()
    }
}

impl Serialize for Tristate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Tristate::Unset => serializer.serialize_none(),
            Tristate::Empty => serializer.serialize_str(""),
            Tristate::Value(value) => serializer.serialize_str(value),
        }
    }
}

impl<'de> Deserialize<'de> for Tristate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(Tristate::from(value.as_deref()))
    }
}

impl JsonSchema for Tristate {
    fn schema_name() -> String {
        "Tristate".to_string()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(gen: &mut SchemaGenerator) -> Schema {
        <String as JsonSchema>::json_schema(gen)
    }
}
