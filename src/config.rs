//! Operator-wide configuration, read from flags or environment

use std::time::Duration;

use clap::Parser;

use crate::relay::DEFAULT_API_URL;
use crate::session::Credentials;
use crate::{Error, Result};

/// Image used for the forwarding agent when a resource doesn't override it
pub const DEFAULT_AGENT_IMAGE: &str = "webhookrelay/webhookrelayd:latest";

/// Operator configuration
#[derive(Clone, Debug, Parser)]
#[command(name = "webhookrelay-operator")]
#[command(about = "Runs Webhook Relay forwarding agents and configures bucket inputs")]
#[command(version)]
pub struct OperatorConfig {
    /// Default forwarding agent image
    #[arg(long, env = "WHR_IMAGE", default_value = DEFAULT_AGENT_IMAGE)]
    pub image: String,

    /// Access token key used when a resource doesn't reference a secret
    #[arg(long, env = "RELAY_KEY", hide_env_values = true)]
    pub relay_key: Option<String>,

    /// Access token secret used when a resource doesn't reference a secret
    #[arg(long, env = "RELAY_SECRET", hide_env_values = true)]
    pub relay_secret: Option<String>,

    /// Webhook Relay API base URL
    #[arg(long, env = "RELAY_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Seconds between reconcile passes of the same resource
    #[arg(long, env = "RECONCILE_PERIOD_SECS", default_value_t = 15, value_parser = clap::value_parser!(u64).range(1..))]
    pub reconcile_period_secs: u64,

    /// Seconds between bucket cache refreshes
    #[arg(long, env = "BUCKET_REFRESH_SECS", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub bucket_refresh_secs: u64,

    /// Timeout for a single Webhook Relay API call
    #[arg(long, env = "RELAY_API_TIMEOUT_SECS", default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub api_timeout_secs: u64,

    /// Metrics and health port
    #[arg(long, env = "METRICS_PORT", default_value_t = 8080)]
    pub metrics_port: u16,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_AGENT_IMAGE.to_string(),
            relay_key: None,
            relay_secret: None,
            api_url: DEFAULT_API_URL.to_string(),
            reconcile_period_secs: 15,
            bucket_refresh_secs: 10,
            api_timeout_secs: 30,
            metrics_port: 8080,
        }
    }
}

impl OperatorConfig {
    /// Reject settings that would stall timers or the requeue loop
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("reconcile_period_secs", self.reconcile_period_secs),
            ("bucket_refresh_secs", self.bucket_refresh_secs),
            ("api_timeout_secs", self.api_timeout_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(Error::ConfigError(format!("{} must be at least 1", name)));
            }
        }
        Ok(())
    }

    pub fn reconcile_period(&self) -> Duration {
        Duration::from_secs(self.reconcile_period_secs)
    }

    pub fn bucket_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.bucket_refresh_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Operator credentials, when both halves are configured and non-empty
    pub fn credentials(&self) -> Option<Credentials> {
        match (self.relay_key.as_deref(), self.relay_secret.as_deref()) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                Some(Credentials::new(key, secret))
            }
            _ => None,
        }
    }
}
