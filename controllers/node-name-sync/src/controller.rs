//! Main controller implementation.
//!
//! Builds the Kubernetes and Proxmox clients, starts the node watcher and
//! cancels in-flight work when the process is asked to stop.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crate::watcher::{watch_nodes, Context, WatchSettings};
use k8s_openapi::api::core::v1::Node;
use kube::{Api, Client};
use proxmox_client::{ClusterClient, ClusterConfig};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Main controller for node name synchronisation.
pub struct Controller {
    node_watcher: JoinHandle<Result<(), ControllerError>>,
    cancel: CancellationToken,
}

impl Controller {
    /// Creates a new controller instance and starts watching nodes.
    pub async fn new(
        cluster_config: &ClusterConfig,
        settings: WatchSettings,
    ) -> Result<Self, ControllerError> {
        info!("Initializing Node Name Sync Controller");

        let kube_client = Client::try_default().await?;
        let cluster = ClusterClient::from_config(cluster_config)?;
        let cancel = CancellationToken::new();

        // Reachability is re-checked on every call; a down cluster at startup
        // is not fatal.
        match cluster.select_endpoint(&cancel).await {
            Ok(endpoint) => info!(endpoint = endpoint.base_url(), "Proxmox API reachable"),
            Err(e) => warn!(error = %e, "No Proxmox endpoint reachable at startup"),
        }

        let node_api: Api<Node> = Api::all(kube_client);
        let reconciler = Reconciler::new(cluster, node_api.clone());
        info!(requeue = ?reconciler.requeue_intervals(), "Requeue intervals");

        let context = Arc::new(Context {
            reconciler: Arc::new(reconciler),
            cancel: cancel.clone(),
        });

        let node_watcher = tokio::spawn(watch_nodes(node_api, context, settings));

        Ok(Self {
            node_watcher,
            cancel,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Node Name Sync Controller running");

        tokio::select! {
            result = &mut self.node_watcher => {
                return result
                    .map_err(|e| ControllerError::Watch(format!("Node watcher panicked: {}", e)))?;
            }
            _ = shutdown_signal() => {
                info!("Shutdown signal received, cancelling in-flight reconciliations");
                self.cancel.cancel();
            }
        }

        self.node_watcher
            .await
            .map_err(|e| ControllerError::Watch(format!("Node watcher panicked: {}", e)))?
    }
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
