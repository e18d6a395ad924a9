//! Wire representations of Webhook Relay resources

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Response headers as sent by the API: header name to ordered values
pub type Headers = BTreeMap<String, Vec<String>>;

/// A routing bucket with its inputs and outputs
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Bucket {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub inputs: Vec<Input>,
    #[serde(deserialize_with = "null_as_default")]
    pub outputs: Vec<Output>,
}

impl Bucket {
    /// Find an input by name, the way specs refer to inputs.
    /// With duplicate names the last one wins.
    pub fn input_named(&self, name: &str) -> Option<&Input> {
        self.inputs.iter().rev().find(|input| input.name == name)
    }
}

/// An endpoint that receives webhooks and optionally answers them
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Input {
    /// Server-assigned id, empty until the input has been created
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub bucket_id: String,
    pub function_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub headers: Headers,
    pub status_code: i32,
    pub body: String,
    pub response_from_output: String,
    pub custom_domain: String,
    pub path_prefix: String,
    pub description: String,
}

/// A destination that inputs forward to
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Output {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    pub bucket_id: String,
    pub destination: String,
    pub internal: bool,
    pub lock_path: bool,
    pub tls_verification: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub headers: BTreeMap<String, String>,
    pub function_id: String,
    pub description: String,
}

/// The API sends `null` for empty collections
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
