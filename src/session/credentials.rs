//! Webhook Relay access token credentials

use std::fmt;

use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use sha2::{Digest, Sha256};

use crate::crd::{ACCESS_TOKEN_KEY_NAME, ACCESS_TOKEN_SECRET_NAME};
use crate::{Error, Result};

/// Access token key/secret pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub key: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }

    /// Short, non-reversible identifier of the key for logs
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.key.as_bytes());
        format!("{:x}", hasher.finalize()).chars().take(12).collect()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.fingerprint())
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Read credentials from the `key` and `secret` fields of a secret
pub async fn from_secret(client: &Client, namespace: &str, name: &str) -> Result<Credentials> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let secret = secrets
        .get(name)
        .await
        .map_err(|e| Error::KubeError(format!("Failed to get secret {}: {}", name, e)))?;

    Ok(Credentials::new(
        secret_value(&secret, ACCESS_TOKEN_KEY_NAME)?,
        secret_value(&secret, ACCESS_TOKEN_SECRET_NAME)?,
    ))
}

/// Get a specific key from a secret
pub fn secret_value(secret: &Secret, key: &str) -> Result<String> {
    let name = secret.metadata.name.as_deref().unwrap_or_default();

    if let Some(value) = secret.string_data.as_ref().and_then(|data| data.get(key)) {
        return Ok(value.clone());
    }

    let value = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .ok_or_else(|| {
            Error::SecretError(format!("Key '{}' not found in secret '{}'", key, name))
        })?;

    String::from_utf8(value.0.clone()).map_err(|e| {
        Error::SecretError(format!(
            "Invalid UTF-8 in secret '{}' key '{}': {}",
            name, key, e
        ))
    })
}
