//! HTTP client for the Webhook Relay API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::error::ApiError;
use super::types::{Bucket, Input};
use super::RelayApi;

/// Public Webhook Relay API endpoint
pub const DEFAULT_API_URL: &str = "https://my.webhookrelay.com/v1";

/// Webhook Relay API client authenticated with an access token key/secret pair
#[derive(Clone)]
pub struct HttpRelayClient {
    http: reqwest::Client,
    base_url: String,
    key: String,
    secret: String,
}

impl std::fmt::Debug for HttpRelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRelayClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpRelayClient {
    /// Create a client for the API rooted at `base_url`
    pub fn new(
        base_url: &str,
        key: impl Into<String>,
        secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        Url::parse(base_url).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("webhookrelay-operator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Transport {
                url: base_url.to_string(),
                source: e,
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.into(),
            secret: secret.into(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        Url::parse(&raw).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", raw, e)))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.key, Some(&self.secret))
    }

    async fn send(
        &self,
        method: &'static str,
        url: &Url,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        debug!(method, url = %url, "Calling Webhook Relay API");

        let response = request.send().await.map_err(|e| ApiError::Transport {
            url: url.to_string(),
            source: e,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                method,
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(
        url: &Url,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        response.json::<T>().await.map_err(|e| ApiError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl RelayApi for HttpRelayClient {
    async fn list_buckets(&self) -> Result<Vec<Bucket>, ApiError> {
        let url = self.url("buckets")?;
        let response = self
            .send("GET", &url, self.request(Method::GET, url.clone()))
            .await?;
        Self::decode(&url, response).await
    }

    async fn create_input(&self, input: &Input) -> Result<Input, ApiError> {
        let url = self.url(&format!("buckets/{}/inputs", input.bucket_id))?;
        let request = self.request(Method::POST, url.clone()).json(input);
        let response = self.send("POST", &url, request).await?;
        Self::decode(&url, response).await
    }

    async fn update_input(&self, input: &Input) -> Result<Input, ApiError> {
        let url = self.url(&format!("buckets/{}/inputs/{}", input.bucket_id, input.id))?;
        let request = self.request(Method::PUT, url.clone()).json(input);
        let response = self.send("PUT", &url, request).await?;
        Self::decode(&url, response).await
    }

    async fn delete_input(&self, bucket_id: &str, input_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("buckets/{}/inputs/{}", bucket_id, input_id))?;
        self.send("DELETE", &url, self.request(Method::DELETE, url.clone()))
            .await?;
        Ok(())
    }
}
