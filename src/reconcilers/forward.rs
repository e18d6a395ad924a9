//! One convergence pass for a WebhookRelayForward resource

use std::collections::HashSet;

use tracing::{error, info, warn};

use super::inputs::{self, ApplyReport};
use super::workload::{self, DeploymentStore, WorkloadAction};
use crate::cache;
use crate::config::OperatorConfig;
use crate::crd::WebhookRelayForward;
use crate::metrics::prometheus::{DEFERRED_BUCKETS, WORKLOAD_ACTIONS};
use crate::session::Session;
use crate::{Error, Result};

/// Validate a WebhookRelayForward spec
pub fn validate(forward: &WebhookRelayForward) -> Result<()> {
    for (idx, bucket) in forward.spec.buckets.iter().enumerate() {
        if bucket.reference.trim().is_empty() {
            return Err(Error::ValidationError(format!(
                "buckets[{}].ref cannot be empty",
                idx
            )));
        }

        let mut seen = HashSet::new();
        for input in &bucket.inputs {
            if input.name.trim().is_empty() {
                return Err(Error::ValidationError(format!(
                    "bucket '{}': input name cannot be empty",
                    bucket.reference
                )));
            }
            if !seen.insert(input.name.as_str()) {
                return Err(Error::ValidationError(format!(
                    "bucket '{}': duplicate input name '{}'",
                    bucket.reference, input.name
                )));
            }
            if input.response_status_code != 0 && !(100..=599).contains(&input.response_status_code) {
                return Err(Error::ValidationError(format!(
                    "bucket '{}': input '{}' responseStatusCode must be 0 or between 100 and 599",
                    bucket.reference, input.name
                )));
            }
        }

        if bucket.outputs.iter().any(|output| output.name.trim().is_empty()) {
            return Err(Error::ValidationError(format!(
                "bucket '{}': output name cannot be empty",
                bucket.reference
            )));
        }
    }

    Ok(())
}

/// How one bucket's synchronization went
#[derive(Debug)]
pub enum BucketOutcome {
    Synced(ApplyReport),
    /// Remote state unknown, retried on the next pass
    Deferred,
    Failed(Error),
}

/// Everything a pass did, for logging and tests
#[derive(Debug)]
pub struct PassReport {
    pub buckets: Vec<(String, BucketOutcome)>,
    pub workload: Result<WorkloadAction>,
}

impl PassReport {
    pub fn bucket(&self, reference: &str) -> Option<&BucketOutcome> {
        self.buckets
            .iter()
            .find(|(name, _)| name == reference)
            .map(|(_, outcome)| outcome)
    }
}

/// Synchronize every declared bucket, then reconcile the agent Deployment.
///
/// Nothing here aborts the pass: bucket and workload failures are logged and
/// recorded, and the next timed pass corrects them.
pub async fn converge(
    forward: &WebhookRelayForward,
    session: &Session,
    deployments: &dyn DeploymentStore,
    config: &OperatorConfig,
) -> PassReport {
    let mut buckets = Vec::with_capacity(forward.spec.buckets.len());

    for bucket_spec in &forward.spec.buckets {
        let outcome = match inputs::synchronize(session.api(), session.cache(), bucket_spec).await {
            Ok(report) => BucketOutcome::Synced(report),
            Err(e) if e.is_deferred() => {
                DEFERRED_BUCKETS.inc();
                info!(bucket = %bucket_spec.reference, "{}", e);
                BucketOutcome::Deferred
            }
            Err(e) => {
                error!(bucket = %bucket_spec.reference, error = %e, "encountered errors while ensuring routing configuration, check your CR spec");
                BucketOutcome::Failed(e)
            }
        };
        buckets.push((bucket_spec.reference.clone(), outcome));
    }

    // The next pass may run before the watcher ticks; it must see what was just written
    let wrote_remote = buckets
        .iter()
        .any(|(_, outcome)| matches!(outcome, BucketOutcome::Synced(report) if report.wrote_remote()));
    if wrote_remote {
        if let Err(e) = cache::refresh(session.api(), session.cache()).await {
            warn!(error = %e, "Failed to refresh bucket cache after applying inputs");
        }
    }

    let desired = workload::build_deployment(forward, session.credentials(), &config.image);
    let workload = workload::reconcile_deployment(deployments, &desired).await;

    match &workload {
        Ok(action) => {
            WORKLOAD_ACTIONS.with_label_values(&[action.as_str()]).inc();
        }
        Err(e) => {
            WORKLOAD_ACTIONS.with_label_values(&["failed"]).inc();
            warn!(error = %e, "Deployment reconcile failed");
        }
    }

    PassReport { buckets, workload }
}
