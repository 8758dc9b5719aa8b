//! Main controller implementation.
//!
//! Wires the Kubernetes client, the process-wide allocators, and the
//! reconciler together, then keeps the IPPool watcher running until
//! shutdown.

use std::sync::Arc;

use cache::CacheAllocator;
use ipam::IpAllocator;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use tokio::task::JoinHandle;
use tracing::info;

use crds::IPPool;

use crate::clients::{KubeIpPoolClient, KubeNadClient, KubePodClient};
use crate::config::ControllerOptions;
use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::watch_ip_pools;

/// Main controller for IPPool management.
pub struct Controller {
    ippool_watcher: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance. `watch_namespace` limits the
    /// IPPool watch to one namespace; all namespaces are watched when it
    /// is not set.
    pub async fn new(
        options: ControllerOptions,
        watch_namespace: Option<String>,
    ) -> Result<Self, ControllerError> {
        info!("initializing vm-dhcp controller");

        let client = Client::try_default().await?;

        let ippool_api: Api<IPPool> = match watch_namespace.as_deref() {
            Some(namespace) => Api::namespaced(client.clone(), namespace),
            None => Api::all(client.clone()),
        };
        let agent_pod_api: Api<Pod> = Api::namespaced(client.clone(), &options.agent_namespace);

        let reconciler = Arc::new(Reconciler::new(
            options,
            Arc::new(IpAllocator::new()),
            Arc::new(CacheAllocator::new()),
            Box::new(KubeNadClient::new(client.clone())),
            Box::new(KubePodClient::new(client.clone())),
            Box::new(KubeIpPoolClient::new(client.clone())),
        ));

        let ippool_watcher = tokio::spawn(watch_ip_pools(
            client,
            reconciler,
            ippool_api,
            agent_pod_api,
        ));

        Ok(Self { ippool_watcher })
    }

    /// Runs the controller until shutdown.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("vm-dhcp controller running");

        self.ippool_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("IPPool watcher panicked: {e}")))?
            .map_err(|e| ControllerError::Watch(format!("IPPool watcher error: {e}")))?;

        Ok(())
    }
}
