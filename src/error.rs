//! Error types for the Webhook Relay Operator

use std::fmt;

use crate::relay::ApiError;

/// Result type for the operator
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the operator
#[derive(Debug)]
pub enum Error {
    /// Kubernetes API error
    KubeError(String),
    /// Configuration error
    ConfigError(String),
    /// Validation error
    ValidationError(String),
    /// Secret error
    SecretError(String),
    /// Webhook Relay session could not be established
    SessionError(String),
    /// Webhook Relay API error
    RelayError(String),
    /// Bucket is not in the remote state cache yet
    BucketNotCached(String),
}

impl Error {
    /// Whether this error only defers work to the next scheduled pass
    pub fn is_deferred(&self) -> bool {
        matches!(self, Error::BucketNotCached(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::KubeError(msg) => write!(f, "Kubernetes API error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Error::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Error::SecretError(msg) => write!(f, "Secret error: {}", msg),
            Error::SessionError(msg) => write!(f, "Session error: {}", msg),
            Error::RelayError(msg) => write!(f, "Webhook Relay API error: {}", msg),
            Error::BucketNotCached(name) => write!(
                f,
                "bucket '{}' not found in the cache, will wait for the next reconcile loop",
                name
            ),
        }
    }
}

impl std::error::Error for Error {}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        Error::RelayError(err.to_string())
    }
}
