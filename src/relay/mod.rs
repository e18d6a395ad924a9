//! Webhook Relay API surface consumed by the operator

pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;

pub use client::{HttpRelayClient, DEFAULT_API_URL};
pub use error::ApiError;
pub use types::{Bucket, Input, Output};

/// Operations the reconcilers need from the Webhook Relay API.
///
/// Implemented over HTTP by [`HttpRelayClient`]; tests substitute in-memory fakes.
#[async_trait]
pub trait RelayApi: Send + Sync {
    /// List every bucket visible to the session credentials, with inputs and outputs
    async fn list_buckets(&self) -> Result<Vec<Bucket>, ApiError>;

    /// Create an input inside `input.bucket_id`
    async fn create_input(&self, input: &Input) -> Result<Input, ApiError>;

    /// Update the input identified by `input.id` inside `input.bucket_id`
    async fn update_input(&self, input: &Input) -> Result<Input, ApiError>;

    /// Delete an input
    async fn delete_input(&self, bucket_id: &str, input_id: &str) -> Result<(), ApiError>;
}
