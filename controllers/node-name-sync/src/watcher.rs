//! Node watcher.
//!
//! Drives the [`Reconciler`] from a `kube_runtime::Controller` over all
//! cluster nodes. The controller guarantees at most one reconciliation per
//! node at a time; distinct nodes run concurrently up to the configured limit.

use crate::error::ControllerError;
use crate::node::NodeStore;
use crate::reconciler::Reconciler;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::{Api, ResourceExt};
use kube_runtime::{
    controller::Config as ControllerConfig,
    watcher, Controller,
};
use proxmox_client::HypervisorClient;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of nodes reconciled in parallel
pub const DEFAULT_CONCURRENCY: u16 = 4;
/// Default quiet period after a node event before reconciling
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(5);

/// Shared state handed to every reconciliation.
pub struct Context<C, S> {
    pub reconciler: Arc<Reconciler<C, S>>,
    /// Cancelled on shutdown; aborts in-flight hypervisor calls
    pub cancel: CancellationToken,
}

/// Scheduling limits for the node controller.
#[derive(Debug, Clone, Copy)]
pub struct WatchSettings {
    /// Distinct nodes reconciled in parallel
    pub concurrency: u16,
    /// Quiet period after an event before its node is reconciled
    pub debounce: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Watches nodes and reconciles them until the context is cancelled.
pub async fn watch_nodes<C, S>(
    api: Api<Node>,
    context: Arc<Context<C, S>>,
    settings: WatchSettings,
) -> Result<(), ControllerError>
where
    C: HypervisorClient + 'static,
    S: NodeStore + 'static,
{
    info!(
        concurrency = settings.concurrency,
        debounce = ?settings.debounce,
        "Starting Node watcher"
    );

    let error_policy = |node: Arc<Node>, error: &ControllerError, ctx: Arc<Context<C, S>>| {
        warn!(node = %node.name_any(), error = %error, "Reconciliation failed");
        ctx.reconciler.error_action(error)
    };

    let reconcile = |node: Arc<Node>, ctx: Arc<Context<C, S>>| async move {
        let name = node.name_any();
        debug!(node = %name, "Reconciling node");
        ctx.reconciler.reconcile_node(&name, &ctx.cancel).await
    };

    let controller_config = ControllerConfig::default()
        .debounce(settings.debounce)
        .concurrency(settings.concurrency);

    let shutdown = context.cancel.clone().cancelled_owned();

    Controller::new(api, watcher::Config::default())
        .with_config(controller_config)
        .graceful_shutdown_on(shutdown)
        .run(reconcile, error_policy, context)
        .for_each(|res| async move {
            match res {
                Ok((node, action)) => debug!(node = %node.name, action = ?action, "Reconciled node"),
                Err(e) => warn!(error = %e, "Node controller error"),
            }
        })
        .await;

    info!("Node watcher stopped");
    Ok(())
}
