//! Errors returned by the Webhook Relay API client

use thiserror::Error;

/// Failure talking to the Webhook Relay API
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-success status
    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    /// The response body was not the expected JSON
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// A request URL could not be built
    #[error("invalid API url: {0}")]
    InvalidUrl(String),
}

impl ApiError {
    /// HTTP status code, if the API responded at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
