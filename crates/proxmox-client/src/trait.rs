//! Client traits for mocking
//!
//! Two seams are defined here:
//! - [`EndpointTransport`]: the operations one Proxmox endpoint offers. The
//!   concrete [`crate::ProxmoxEndpoint`] talks HTTP; tests use in-memory fakes.
//! - [`HypervisorClient`]: the capability set a controller needs from the
//!   whole cluster. The concrete [`crate::ClusterClient`] implements it on top
//!   of a pool of endpoints.

use crate::config::TaskPolicy;
use crate::error::{ClusterError, ProxmoxError};
use crate::models::*;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Operations offered by a single Proxmox VE endpoint
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait EndpointTransport: Send + Sync {
    /// Identifier used in logs and errors (the endpoint URL)
    fn endpoint(&self) -> &str;

    /// Cheap liveness probe
    async fn version(&self) -> Result<VersionInfo, ProxmoxError>;

    /// Hypervisor members known to this endpoint
    async fn list_nodes(&self) -> Result<Vec<NodeSummary>, ProxmoxError>;

    /// Guests hosted by one hypervisor member
    async fn list_guests(&self, node: &str) -> Result<Vec<GuestSummary>, ProxmoxError>;

    /// Full guest configuration; `None` when the guest has no configuration
    async fn guest_config(&self, node: &str, vmid: u32) -> Result<Option<GuestConfig>, ProxmoxError>;

    /// Submit a name change; the change is applied by an asynchronous task
    async fn set_guest_name(&self, node: &str, vmid: u32, name: &str) -> Result<Upid, ProxmoxError>;

    /// Current state of an asynchronous task
    async fn task_status(&self, node: &str, upid: &Upid) -> Result<TaskStatus, ProxmoxError>;

    /// Poll a task until it stops or the policy's deadline passes
    ///
    /// # Returns
    /// * `Ok(())` - Task stopped with exit status `OK`
    /// * `Err(ProxmoxError::TaskFailed)` - Task stopped with another exit status
    /// * `Err(ProxmoxError::TaskTimeout)` - Task still running at the deadline,
    ///   or a status request still outstanding when it passes
    async fn wait_for_task(&self, node: &str, upid: &Upid, policy: TaskPolicy) -> Result<(), ProxmoxError> {
        let deadline = Instant::now() + policy.timeout;
        let timed_out = || ProxmoxError::TaskTimeout {
            upid: upid.to_string(),
            deadline: policy.timeout,
        };

        loop {
            // A slow status request must not stretch the deadline.
            let status = tokio::select! {
                biased;
                status = self.task_status(node, upid) => status?,
                () = tokio::time::sleep_until(deadline) => return Err(timed_out()),
            };
            if status.is_stopped() {
                if status.is_ok() {
                    return Ok(());
                }
                return Err(ProxmoxError::TaskFailed {
                    upid: upid.to_string(),
                    exit_status: status.exitstatus.unwrap_or_else(|| "unknown".to_string()),
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(timed_out());
            }

            debug!("Task {} on {} still {}, polling again", upid, node, status.status);
            tokio::time::sleep(policy.poll_interval.min(deadline - now)).await;
        }
    }
}

/// Cluster-wide guest operations a controller depends on
#[async_trait::async_trait]
pub trait HypervisorClient: Send + Sync {
    /// Find the guest whose identity key equals `identity_key`
    ///
    /// Returns `Ok(None)` when no guest matches.
    async fn resolve_by_identity(
        &self,
        identity_key: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Guest>, ClusterError>;

    /// Rename a guest and wait until the rename task has finished
    ///
    /// `hypervisor_node` is the member recorded on the [`Guest`] at discovery
    /// time; it is not re-resolved.
    async fn rename_guest(
        &self,
        hypervisor_node: &str,
        vmid: u32,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ClusterError>;
}
