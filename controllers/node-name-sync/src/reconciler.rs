//! Reconciliation logic for Kubernetes nodes.
//!
//! Each pass re-reads the node and the hypervisor inventory, so nothing is
//! carried between invocations. Every terminal path schedules a fixed
//! requeue, which turns the loop into a periodic consistency check that also
//! catches renames made outside the controller.

use crate::error::ControllerError;
use crate::node::{is_control_plane, system_uuid, NodeStore};
use kube_runtime::controller::Action;
use proxmox_client::HypervisorClient;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Fixed requeue delays for each terminal path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequeueIntervals {
    /// Control-plane nodes are never renamed
    pub control_plane: Duration,
    /// No guest carries the node's identity (yet)
    pub guest_not_found: Duration,
    /// Guest name already matches
    pub in_sync: Duration,
    /// Rename completed; re-verify on the next pass
    pub renamed: Duration,
    /// Discovery or mutation failed
    pub error: Duration,
}

impl Default for RequeueIntervals {
    fn default() -> Self {
        Self {
            control_plane: Duration::from_secs(5 * 60),
            guest_not_found: Duration::from_secs(10 * 60),
            in_sync: Duration::from_secs(30 * 60),
            renamed: Duration::from_secs(5 * 60),
            error: Duration::from_secs(2 * 60),
        }
    }
}

/// Reconciler that converges guest names onto node names.
pub struct Reconciler<C, S> {
    hypervisor: C,
    nodes: S,
    requeue: RequeueIntervals,
}

impl<C, S> Reconciler<C, S>
where
    C: HypervisorClient,
    S: NodeStore,
{
    /// Creates a new reconciler with the default requeue intervals.
    pub fn new(hypervisor: C, nodes: S) -> Self {
        Self {
            hypervisor,
            nodes,
            requeue: RequeueIntervals::default(),
        }
    }

    /// Replaces the requeue intervals.
    pub fn with_requeue_intervals(mut self, requeue: RequeueIntervals) -> Self {
        self.requeue = requeue;
        self
    }

    /// The requeue intervals in effect.
    pub fn requeue_intervals(&self) -> RequeueIntervals {
        self.requeue
    }

    /// Reconciles the node with the given name.
    ///
    /// Returns `Action::await_change()` when the node no longer exists and a
    /// fixed requeue on every other successful path. Hypervisor failures
    /// surface as [`ControllerError::Discovery`] or
    /// [`ControllerError::Mutation`] so the error policy can requeue them.
    pub async fn reconcile_node(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Action, ControllerError> {
        let node = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ControllerError::Cancelled),
            node = self.nodes.get_node(name) => node?,
        };

        let Some(node) = node else {
            info!(node = name, "Node not found, probably deleted");
            return Ok(Action::await_change());
        };
        let node_name = node.metadata.name.as_deref().unwrap_or(name);

        if is_control_plane(&node) {
            info!(node = node_name, "Skipping control plane node");
            return Ok(Action::requeue(self.requeue.control_plane));
        }

        let Some(identity) = system_uuid(&node) else {
            info!(node = node_name, "Node has not reported a system UUID yet");
            return Ok(Action::requeue(self.requeue.guest_not_found));
        };

        debug!(node = node_name, system_uuid = identity, "Resolving guest by identity");
        let guest = match self.hypervisor.resolve_by_identity(identity, cancel).await {
            Ok(Some(guest)) => guest,
            Ok(None) => {
                info!(
                    node = node_name,
                    system_uuid = identity,
                    "No Proxmox guest found for node"
                );
                return Ok(Action::requeue(self.requeue.guest_not_found));
            }
            Err(e) => {
                error!(node = node_name, error = %e, "Failed to look up guest in Proxmox");
                return Err(e.into());
            }
        };

        if guest.name == node_name {
            debug!(node = node_name, vmid = guest.vmid, "Guest name already matches node name");
            return Ok(Action::requeue(self.requeue.in_sync));
        }

        info!(
            node = node_name,
            vmid = guest.vmid,
            hypervisor_node = %guest.hypervisor_node,
            current_name = %guest.name,
            "Renaming guest to match node name"
        );
        if let Err(e) = self
            .hypervisor
            .rename_guest(&guest.hypervisor_node, guest.vmid, node_name, cancel)
            .await
        {
            error!(node = node_name, vmid = guest.vmid, error = %e, "Failed to rename guest");
            return Err(e.into());
        }

        info!(node = node_name, vmid = guest.vmid, "Guest renamed");
        Ok(Action::requeue(self.requeue.renamed))
    }

    /// Requeue decision for a failed reconciliation.
    pub fn error_action(&self, error: &ControllerError) -> Action {
        debug!(error = %error, delay = ?self.requeue.error, "Requeueing after error");
        Action::requeue(self.requeue.error)
    }
}
