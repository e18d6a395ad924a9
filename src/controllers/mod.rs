//! Controller implementations for watching and reconciling resources

pub mod forward_controller;

use kube::Client;
use std::sync::Arc;

use crate::config::OperatorConfig;
use crate::reconcilers::workload::{DeploymentStore, KubeDeploymentStore};
use crate::session::{KubeSessionFactory, SessionManager};

/// Shared context for controllers
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Operator configuration
    pub config: Arc<OperatorConfig>,
    /// Webhook Relay sessions per resource
    pub sessions: SessionManager,
    /// Agent Deployment access
    pub deployments: Arc<dyn DeploymentStore>,
}

impl Context {
    /// Create a new context
    pub fn new(client: Client, config: OperatorConfig) -> Arc<Self> {
        let config = Arc::new(config);
        let factory = KubeSessionFactory::new(client.clone(), Arc::clone(&config));

        Arc::new(Self {
            deployments: Arc::new(KubeDeploymentStore::new(client.clone())),
            sessions: SessionManager::new(Arc::new(factory)),
            client,
            config,
        })
    }
}
