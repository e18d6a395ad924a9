//! Webhook Relay Kubernetes Operator
//!
//! Main entry point for the operator. Sets up the Kubernetes client,
//! registers the controller, and runs the reconciliation loop.

use clap::Parser;
use kube::Client;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use webhookrelay_operator::{
    config::OperatorConfig,
    controllers::{forward_controller, Context},
    metrics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = OperatorConfig::parse();
    config.validate()?;

    info!("Starting Webhook Relay Operator");
    if config.credentials().is_none() {
        info!("RELAY_KEY/RELAY_SECRET not set, resources must reference a secret");
    }

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let metrics_port = config.metrics_port;
    let context = Context::new(client, config);

    let metrics_handle = tokio::spawn(metrics::serve(metrics_port));
    info!("Metrics server starting on port {}", metrics_port);

    let controller_handle = tokio::spawn(forward_controller::run(context));

    tokio::select! {
        _ = controller_handle => {
            error!("WebhookRelayForward controller exited unexpectedly");
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
        }
        res = shutdown_signal() => {
            res?;
            info!("Received shutdown signal, stopping operator");
        }
    }

    info!("Webhook Relay Operator stopped");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,webhookrelay_operator=debug,kube=warn,hyper=warn")
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            res = signal::ctrl_c() => {
                res?;
                info!("Received CTRL+C signal");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM signal");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received CTRL+C signal");
    }

    Ok(())
}
