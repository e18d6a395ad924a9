//! Controller for WebhookRelayForward resources
//!
//! Passes are level-triggered: each one re-derives the whole desired state
//! from the current resource. Every pass, successful or not, is followed by
//! another after the fixed reconcile period.

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::{
    runtime::{
        controller::{Action, Controller},
        reflector::Store,
        watcher::Config,
    },
    Api, ResourceExt,
};
use tracing::{debug, error, info, instrument, warn};

use crate::controllers::Context;
use crate::crd::WebhookRelayForward;
use crate::metrics::prometheus::{RECONCILE_DURATION, RECONCILIATIONS, RECONCILIATION_ERRORS};
use crate::reconcilers::forward::{self, BucketOutcome};
use crate::reconcilers::status;
use crate::reconcilers::workload::WorkloadAction;
use crate::Error;

/// Run the WebhookRelayForward controller
pub async fn run(ctx: Arc<Context>) {
    let client = ctx.client.clone();
    let forwards: Api<WebhookRelayForward> = Api::all(client.clone());
    let deployments: Api<Deployment> = Api::all(client);

    info!("Starting WebhookRelayForward controller");

    let controller = Controller::new(forwards, Config::default().any_semantic())
        .owns(deployments, Config::default());

    let sweeper = tokio::spawn(sweep_sessions(controller.store(), Arc::clone(&ctx)));

    controller
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok(o) => debug!("Reconciled {:?}", o),
                Err(e) => error!("Reconcile failed: {:?}", e),
            }
        })
        .await;

    sweeper.abort();
    info!("WebhookRelayForward controller stopped");
}

/// Drop sessions of resources that no longer exist
async fn sweep_sessions(store: Store<WebhookRelayForward>, ctx: Arc<Context>) {
    let mut ticker = tokio::time::interval(ctx.config.reconcile_period());
    loop {
        ticker.tick().await;
        let live: HashSet<String> = store
            .state()
            .iter()
            .map(|forward| format!("{}/{}", forward.namespace().unwrap_or_default(), forward.name_any()))
            .collect();
        let dropped = ctx.sessions.retain(|key| live.contains(key)).await;
        if dropped > 0 {
            info!(dropped, "Dropped sessions of deleted resources");
        }
    }
}

/// Reconcile a WebhookRelayForward resource
#[instrument(skip(forward, ctx), fields(name = %forward.name_any(), namespace = forward.namespace().unwrap_or_default()))]
async fn reconcile(forward: Arc<WebhookRelayForward>, ctx: Arc<Context>) -> Result<Action, Error> {
    let start = std::time::Instant::now();
    let ns = forward.namespace().unwrap_or_default();
    let name = forward.name_any();

    RECONCILIATIONS
        .with_label_values(&["WebhookRelayForward"])
        .inc();

    let result = apply(&forward, &ctx).await;

    let duration = start.elapsed().as_secs_f64();
    RECONCILE_DURATION
        .with_label_values(&["WebhookRelayForward"])
        .observe(duration);

    match &result {
        Ok(_) => info!("Reconciled {}/{} in {:.2}s", ns, name, duration),
        Err(e) => {
            RECONCILIATION_ERRORS
                .with_label_values(&["WebhookRelayForward"])
                .inc();
            error!("Failed to reconcile {}/{}: {}", ns, name, e);
        }
    }

    result
}

/// Run one convergence pass
async fn apply(forward: &WebhookRelayForward, ctx: &Context) -> Result<Action, Error> {
    let ns = forward.namespace().unwrap_or_default();
    let name = forward.name_any();

    if forward.metadata.deletion_timestamp.is_some() {
        // Owned Deployments are garbage collected through owner references
        ctx.sessions.forget(&ns, &name).await;
        info!("{}/{} is being deleted, nothing to do", ns, name);
        return Ok(Action::await_change());
    }

    forward::validate(forward)?;

    let session = ctx.sessions.ensure_session(forward).await?;

    let report = forward::converge(forward, &session, ctx.deployments.as_ref(), &ctx.config).await;

    for (bucket, outcome) in &report.buckets {
        match outcome {
            BucketOutcome::Synced(applied) => {
                let failed = applied.failed().count();
                if failed > 0 {
                    warn!(bucket = %bucket, failed, "Some inputs failed to apply");
                }
            }
            BucketOutcome::Deferred => debug!(bucket = %bucket, "Bucket deferred"),
            BucketOutcome::Failed(e) => warn!(bucket = %bucket, error = %e, "Bucket failed"),
        }
    }

    // A freshly created agent needs nothing else this cycle
    if !matches!(report.workload, Ok(WorkloadAction::Created)) {
        let endpoints = status::public_endpoints(&forward.spec, session.cache(), &ctx.config.api_url);
        if let Err(e) = status::update_status(forward, &ctx.client, endpoints).await {
            warn!(error = %e, "Failed to update status");
        }
    }

    Ok(Action::requeue(ctx.config.reconcile_period()))
}

/// Error policy for the controller
fn error_policy(forward: Arc<WebhookRelayForward>, err: &Error, ctx: Arc<Context>) -> Action {
    let ns = forward.namespace().unwrap_or_default();
    let name = forward.name_any();

    error!("Reconciliation error for {}/{}: {}", ns, name, err);

    // Retry is purely time-based, whatever failed
    Action::requeue(ctx.config.reconcile_period())
}
